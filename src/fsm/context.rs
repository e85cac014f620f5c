//! Shared context threaded through every lifecycle handler.
//!
//! The control loop writes facts into it (link up, subscribed, stop
//! requested, fatal error); state handlers read the facts to pick the next
//! state and write back the indicator signal for the state they enter.

use crate::app::ports::IndicatorSignal;
use crate::error::Error;

pub struct LifecycleContext {
    // -- Facts reported by the control loop --
    /// External connectivity is up (precondition, not managed here).
    pub network_ready: bool,
    /// Broker connected and control topic subscribed.
    pub subscribed: bool,
    /// An external stop signal was observed.
    pub stop_requested: bool,
    /// First unrecoverable error; forces `Stopped`.
    pub fatal: Option<Error>,

    // -- Output --
    /// Indicator signal chosen by the most recent enter action.
    pub indicator: IndicatorSignal,
}

impl LifecycleContext {
    pub fn new() -> Self {
        Self {
            network_ready: false,
            subscribed: false,
            stop_requested: false,
            fatal: None,
            indicator: IndicatorSignal::NotOperational,
        }
    }

    /// `true` once the loop must wind down.
    pub fn must_stop(&self) -> bool {
        self.stop_requested || self.fatal.is_some()
    }
}

impl Default for LifecycleContext {
    fn default() -> Self {
        Self::new()
    }
}
