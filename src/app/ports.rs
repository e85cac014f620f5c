//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlLoop (domain)
//! ```
//!
//! Driven adapters (ultrasonic sensor, status LED, MQTT client, event
//! sinks, config storage) implement these traits.  The
//! [`ControlLoop`](super::service::ControlLoop) owns or borrows them via
//! generics, so the domain core never touches hardware directly and every
//! port can be replaced by a fake in tests.

use crate::config::AgentConfig;
use crate::error::{ConnectError, PublishError, SensorError, SubscribeError};
use crate::sensors::DistanceSample;

use super::inbox::InboxHandle;

// ───────────────────────────────────────────────────────────────
// Distance port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Single-shot distance measurement.
///
/// `&mut self` is the reentrancy guard: one trigger/echo exchange at a time.
pub trait DistanceSource {
    fn measure(&mut self) -> Result<DistanceSample, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (driven adapter: domain → LED / display)
// ───────────────────────────────────────────────────────────────

/// Presentation-independent status taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorSignal {
    /// Booting; nothing is connected yet.
    NotOperational,
    /// Network link up, broker session not yet confirmed.
    PartiallyOperational,
    /// Connected and subscribed.
    Operational,
    /// Remote `ON` command.
    CommandOn,
    /// Remote `OFF` command.
    CommandOff,
    /// Loop has exited (clean stop or fatal error).
    Stopped,
}

/// Best-effort status output.  Must not block and must not fail loudly:
/// implementations log their own driver errors.
pub trait StatusIndicator {
    fn show(&mut self, signal: IndicatorSignal);
}

// ───────────────────────────────────────────────────────────────
// Telemetry transport port (driven adapter: domain ↔ broker)
// ───────────────────────────────────────────────────────────────

/// Publish/subscribe transport to the message broker.
///
/// Inbound messages on subscribed topics are pushed into the given
/// [`InboxHandle`] from whatever context the client receives them in;
/// the control loop drains the inbox once per cycle.
pub trait TelemetryTransport {
    fn connect(&mut self) -> Result<(), ConnectError>;

    fn subscribe(&mut self, topic: &str, inbox: InboxHandle) -> Result<(), SubscribeError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Release the session.  Safe to call when not connected.
    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic microsecond clock used for echo edge timestamps.
pub trait MonotonicClock {
    fn now_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AgentEvent`](super::events::AgentEvent)s
/// through this port.  Adapters decide where they go (serial log, test
/// recorder, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AgentEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists agent configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid values are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`ConfigError::NotFound`] if nothing has been stored yet.
    fn load(&self) -> Result<AgentConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &AgentConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
