//! Sensor subsystem.
//!
//! One driver: the top-mounted ultrasonic range finder that measures the
//! air gap above the liquid.  Drivers are written against `embedded-hal`
//! 1.0 traits so the same code runs on ESP-IDF pins and on host fakes.

pub mod ultrasonic;

/// One distance measurement.  Produced once per cycle, never retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    /// Sensor face to liquid surface (cm).
    pub distance_cm: f32,
    /// Monotonic timestamp of the falling echo edge (µs).
    pub measured_at_us: u64,
}
