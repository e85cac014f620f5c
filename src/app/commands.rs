//! Inbound commands from the control feed.
//!
//! The command set is intentionally tiny: two exact-match payloads that
//! drive the status indicator, so bidirectional messaging can be checked
//! from the broker dashboard.  Matching is byte-exact and case-sensitive,
//! with no trimming.

use super::inbox::MAX_PAYLOAD_LEN;

/// Commands that the control feed can send into the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Payload `ON`: light the indicator.
    IndicatorOn,
    /// Payload `OFF`: blank the indicator.
    IndicatorOff,
    /// Anything else; kept for logging, otherwise ignored.
    Unrecognized(heapless::Vec<u8, MAX_PAYLOAD_LEN>),
}

impl ControlCommand {
    pub fn parse(payload: &[u8]) -> Self {
        match payload {
            b"ON" => Self::IndicatorOn,
            b"OFF" => Self::IndicatorOff,
            other => {
                let keep = other.len().min(MAX_PAYLOAD_LEN);
                let mut raw = heapless::Vec::new();
                let _ = raw.extend_from_slice(&other[..keep]);
                Self::Unrecognized(raw)
            }
        }
    }
}
