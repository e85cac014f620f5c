//! Outbound application events.
//!
//! The [`ControlLoop`](super::service::ControlLoop) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial or record in tests.

use crate::error::{Error, PublishError, SensorError};
use crate::fsm::OperationalState;

use super::commands::ControlCommand;

/// Structured events emitted by the control loop.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The lifecycle machine was started (carries initial state).
    Started(OperationalState),

    /// The lifecycle machine moved between states.
    StateChanged {
        from: OperationalState,
        to: OperationalState,
    },

    /// One measurement turned into a capacity figure.
    Reading(TelemetryData),

    /// The cycle was skipped because the sensor produced no sample.
    CycleSkipped(SensorError),

    /// A reading was not published because the broker quota is spent.
    Throttled(TelemetryData),

    /// A command arrived on the control feed.
    Command(ControlCommand),

    /// A publish failed after `attempts` tries.
    PublishFailed { error: PublishError, attempts: u32 },

    /// The loop stopped; `cause` is `None` for a requested stop.
    Stopped { cause: Option<Error> },
}

/// A point-in-time reading suitable for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryData {
    pub distance_cm: f32,
    pub remaining_litres: f32,
    pub percent_full: f32,
    /// Monotonic timestamp of the sample (µs).
    pub measured_at_us: u64,
}
