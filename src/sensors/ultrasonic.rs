//! Time-of-flight ultrasonic range finder (HC-SR04 / JSN-SR04T).
//!
//! ```text
//!  trigger  ──┐ settle ┌── pulse ──┐
//!             └────────┘           └──────────────────────────────
//!  echo     ────────────────────────────┐   time of flight   ┌────
//!                                       └────────────────────┘
//!                                     start                finish
//! ```
//!
//! Both echo waits are bounded by `echo_timeout_us`, measured against a
//! [`MonotonicClock`], so a disconnected sensor or an out-of-range target
//! yields [`SensorError::Timeout`] instead of hanging the loop.  A dead
//! time follows every measurement, successful or not, so residual echoes
//! from the tank walls are not picked up by the next trigger.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, warn};

use crate::app::ports::{DistanceSource, MonotonicClock};
use crate::config::SensorTiming;
use crate::error::{EchoEdge, SensorError};

use super::DistanceSample;

/// Speed of sound in air at ~20 °C.
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.034;

/// Convert a round-trip echo duration into a one-way distance.
pub fn echo_to_distance_cm(round_trip_us: u64) -> f32 {
    round_trip_us as f32 * SPEED_OF_SOUND_CM_PER_US / 2.0
}

pub struct UltrasonicSensor<T, E, D, C> {
    trigger: T,
    echo: E,
    delay: D,
    clock: C,
    timing: SensorTiming,
}

impl<T, E, D, C> UltrasonicSensor<T, E, D, C>
where
    T: OutputPin,
    E: InputPin,
    D: DelayNs,
    C: MonotonicClock,
{
    pub fn new(trigger: T, echo: E, delay: D, clock: C, timing: SensorTiming) -> Self {
        Self {
            trigger,
            echo,
            delay,
            clock,
            timing,
        }
    }

    fn exchange(&mut self) -> Result<DistanceSample, SensorError> {
        self.fire_trigger()?;
        let start = self.wait_for_level(true, EchoEdge::Rising)?;
        let finish = self.wait_for_level(false, EchoEdge::Falling)?;

        let round_trip_us = finish.saturating_sub(start);
        let distance_cm = echo_to_distance_cm(round_trip_us);
        debug!("ultrasonic: echo {} us -> {:.1} cm", round_trip_us, distance_cm);

        Ok(DistanceSample {
            distance_cm,
            measured_at_us: finish,
        })
    }

    fn fire_trigger(&mut self) -> Result<(), SensorError> {
        self.trigger.set_low().map_err(|_| SensorError::Gpio)?;
        self.delay.delay_us(self.timing.settle_us);
        self.trigger.set_high().map_err(|_| SensorError::Gpio)?;
        self.delay.delay_us(self.timing.trigger_pulse_us);
        self.trigger.set_low().map_err(|_| SensorError::Gpio)
    }

    /// Poll the echo line until it reads `high`, or the timeout elapses.
    /// Returns the timestamp at which the level was observed.
    fn wait_for_level(&mut self, high: bool, edge: EchoEdge) -> Result<u64, SensorError> {
        let timeout = u64::from(self.timing.echo_timeout_us);
        let begin = self.clock.now_us();
        loop {
            let level = self.echo.is_high().map_err(|_| SensorError::Gpio)?;
            let now = self.clock.now_us();
            if level == high {
                return Ok(now);
            }
            if now.saturating_sub(begin) > timeout {
                return Err(SensorError::Timeout(edge));
            }
        }
    }
}

impl<T, E, D, C> DistanceSource for UltrasonicSensor<T, E, D, C>
where
    T: OutputPin,
    E: InputPin,
    D: DelayNs,
    C: MonotonicClock,
{
    fn measure(&mut self) -> Result<DistanceSample, SensorError> {
        let result = self.exchange();
        if let Err(e) = result {
            warn!("ultrasonic: {}", e);
        }
        self.delay.delay_ms(self.timing.dead_time_ms);
        result
    }
}
