//! Unified error types for the tank-level agent.
//!
//! One small `Copy` enum per subsystem, all funnelled into the top-level
//! [`Error`] so the control loop and the firmware entry point handle
//! failures uniformly.  Which errors are fatal is decided by the
//! control loop, not here; see [`PublishError::is_fatal`].

use core::fmt;

use crate::app::ports::ConfigError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the agent funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The distance sensor did not produce a sample.
    Sensor(SensorError),
    /// A telemetry publish failed (after retries, when escalated).
    Publish(PublishError),
    /// The broker connection could not be established.
    Connect(ConnectError),
    /// The control topic subscription was refused.
    Subscribe(SubscribeError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Publish(e) => write!(f, "publish: {e}"),
            Self::Connect(e) => write!(f, "connect: {e}"),
            Self::Subscribe(e) => write!(f, "subscribe: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

/// Which echo transition a bounded wait was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEdge {
    /// Echo line low → high (start of the time-of-flight window).
    Rising,
    /// Echo line high → low (end of the time-of-flight window).
    Falling,
}

impl fmt::Display for EchoEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Falling => write!(f, "falling"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The echo edge did not arrive within the configured bound
    /// (sensor disconnected, or target beyond maximum range).
    Timeout(EchoEdge),
    /// Driving the trigger or reading the echo pin failed.
    Gpio,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(edge) => write!(f, "timed out waiting for {edge} echo edge"),
            Self::Gpio => write!(f, "GPIO access failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// The broker or link hiccuped; the same publish may succeed later.
    Transient,
    /// The transport reports that the broker connection is gone.
    ConnectionClosed,
    /// `publish` was called before a successful `connect`.
    NotConnected,
}

impl PublishError {
    /// Errors that cannot be cured by retrying the same publish.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::NotConnected)
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient broker error"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl From<PublishError> for Error {
    fn from(e: PublishError) -> Self {
        Self::Publish(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The broker rejected the session (bad credentials, client id clash).
    Refused,
    /// No CONNACK within the connect timeout.
    Timeout,
    /// The client could not be created or the socket failed.
    Transport,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused => write!(f, "broker refused connection"),
            Self::Timeout => write!(f, "broker connect timed out"),
            Self::Transport => write!(f, "transport failure"),
        }
    }
}

impl From<ConnectError> for Error {
    fn from(e: ConnectError) -> Self {
        Self::Connect(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeError {
    /// The broker refused the topic filter.
    Rejected,
    /// `subscribe` was called before a successful `connect`.
    NotConnected,
}

impl fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "subscription rejected"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl From<SubscribeError> for Error {
    fn from(e: SubscribeError) -> Self {
        Self::Subscribe(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
