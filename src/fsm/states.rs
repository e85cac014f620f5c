//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  INITIALIZING ──[link up]──▶ NETWORK_READY ──[connected+subscribed]──▶ BROKER_SUBSCRIBED
//!                                                                              │
//!                                                                      [first cycle]
//!                                                                              ▼
//!                                                                          STREAMING
//!
//!  Any state ──[stop signal | fatal error]──▶ STOPPED (terminal)
//! ```

use super::context::LifecycleContext;
use super::{OperationalState, StateDescriptor};
use crate::app::ports::IndicatorSignal;
use log::{error, info};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; OperationalState::COUNT] {
    [
        StateDescriptor {
            id: OperationalState::Initializing,
            name: "Initializing",
            on_enter: Some(initializing_enter),
            on_exit: None,
            on_update: initializing_update,
        },
        StateDescriptor {
            id: OperationalState::NetworkReady,
            name: "NetworkReady",
            on_enter: Some(network_ready_enter),
            on_exit: None,
            on_update: network_ready_update,
        },
        StateDescriptor {
            id: OperationalState::BrokerSubscribed,
            name: "BrokerSubscribed",
            on_enter: Some(broker_subscribed_enter),
            on_exit: None,
            on_update: broker_subscribed_update,
        },
        StateDescriptor {
            id: OperationalState::Streaming,
            name: "Streaming",
            on_enter: Some(streaming_enter),
            on_exit: None,
            on_update: streaming_update,
        },
        StateDescriptor {
            id: OperationalState::Stopped,
            name: "Stopped",
            on_enter: Some(stopped_enter),
            on_exit: None,
            on_update: stopped_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INITIALIZING: waiting for the host to report the link is up
// ═══════════════════════════════════════════════════════════════════════════

fn initializing_enter(ctx: &mut LifecycleContext) {
    ctx.indicator = IndicatorSignal::NotOperational;
    info!("INITIALIZING: waiting for network");
}

fn initializing_update(ctx: &mut LifecycleContext) -> Option<OperationalState> {
    if ctx.must_stop() {
        return Some(OperationalState::Stopped);
    }
    ctx.network_ready.then_some(OperationalState::NetworkReady)
}

// ═══════════════════════════════════════════════════════════════════════════
//  NETWORK_READY: link up, broker session pending
// ═══════════════════════════════════════════════════════════════════════════

fn network_ready_enter(ctx: &mut LifecycleContext) {
    ctx.indicator = IndicatorSignal::PartiallyOperational;
    info!("NETWORK_READY: connecting to broker");
}

fn network_ready_update(ctx: &mut LifecycleContext) -> Option<OperationalState> {
    if ctx.must_stop() {
        return Some(OperationalState::Stopped);
    }
    ctx.subscribed.then_some(OperationalState::BrokerSubscribed)
}

// ═══════════════════════════════════════════════════════════════════════════
//  BROKER_SUBSCRIBED: session confirmed, first cycle not yet run
// ═══════════════════════════════════════════════════════════════════════════

fn broker_subscribed_enter(ctx: &mut LifecycleContext) {
    ctx.indicator = IndicatorSignal::Operational;
    info!("BROKER_SUBSCRIBED: control feed active");
}

fn broker_subscribed_update(ctx: &mut LifecycleContext) -> Option<OperationalState> {
    if ctx.must_stop() {
        return Some(OperationalState::Stopped);
    }
    Some(OperationalState::Streaming)
}

// ═══════════════════════════════════════════════════════════════════════════
//  STREAMING: steady-state measure/publish cycles
// ═══════════════════════════════════════════════════════════════════════════

fn streaming_enter(ctx: &mut LifecycleContext) {
    ctx.indicator = IndicatorSignal::Operational;
    info!("STREAMING: publishing tank level");
}

fn streaming_update(ctx: &mut LifecycleContext) -> Option<OperationalState> {
    ctx.must_stop().then_some(OperationalState::Stopped)
}

// ═══════════════════════════════════════════════════════════════════════════
//  STOPPED: terminal
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_enter(ctx: &mut LifecycleContext) {
    ctx.indicator = IndicatorSignal::Stopped;
    match &ctx.fatal {
        Some(e) => error!("STOPPED: fatal error: {}", e),
        None => info!("STOPPED: stop requested"),
    }
}

fn stopped_update(_ctx: &mut LifecycleContext) -> Option<OperationalState> {
    None
}
