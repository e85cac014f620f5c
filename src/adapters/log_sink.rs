//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured agent events to the
//! ESP-IDF logger (UART / USB-CDC in production, the test logger on host).

use log::{info, warn};

use crate::app::commands::ControlCommand;
use crate::app::events::AgentEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AgentEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AgentEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AgentEvent::Reading(t) => {
                info!("Remaining volume: {:.1} litres", t.remaining_litres);
                info!("Tank at {:.1}% capacity", t.percent_full);
                info!(
                    "TELEM | distance={:.1}cm | t={}us",
                    t.distance_cm, t.measured_at_us
                );
            }
            AgentEvent::CycleSkipped(e) => {
                warn!("SKIP  | no sample: {}", e);
            }
            AgentEvent::Throttled(t) => {
                warn!("QUOTA | publish budget spent, {:.1}% not sent", t.percent_full);
            }
            AgentEvent::Command(cmd) => match cmd {
                ControlCommand::IndicatorOn => info!("CMD   | ON"),
                ControlCommand::IndicatorOff => info!("CMD   | OFF"),
                ControlCommand::Unrecognized(raw) => {
                    warn!("CMD   | unrecognized {:?}", String::from_utf8_lossy(raw));
                }
            },
            AgentEvent::PublishFailed { error, attempts } => {
                warn!("PUB   | failed after {} attempt(s): {}", attempts, error);
            }
            AgentEvent::Stopped { cause } => match cause {
                Some(e) => warn!("STOP  | fatal: {}", e),
                None => info!("STOP  | requested"),
            },
        }
    }
}
