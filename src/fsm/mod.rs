//! Function-pointer lifecycle state machine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌──────────────────┬───────────┬──────────┬──────────────┐  │
//! │  │ OperationalState │ on_enter  │ on_exit  │ on_update    │  │
//! │  ├──────────────────┼───────────┼──────────┼──────────────┤  │
//! │  │ Initializing     │ fn(ctx)   │ -        │ fn(ctx)->Opt │  │
//! │  │ NetworkReady     │ fn(ctx)   │ -        │ fn(ctx)->Opt │  │
//! │  │ BrokerSubscribed │ fn(ctx)   │ -        │ fn(ctx)->Opt │  │
//! │  │ Streaming        │ fn(ctx)   │ -        │ fn(ctx)->Opt │  │
//! │  │ Stopped          │ fn(ctx)   │ -        │ fn(ctx)->Opt │  │
//! │  └──────────────────┴───────────┴──────────┴──────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The control loop records what happened (link up, subscribed, stop
//! requested, fatal error) in the [`LifecycleContext`] and ticks the
//! engine.  `on_update` for the **current** state decides the next one;
//! the engine runs `on_exit`/`on_enter` around the move.  Enter actions
//! choose the indicator signal for the new state.

pub mod context;
pub mod states;

use context::LifecycleContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all lifecycle states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationalState {
    Initializing = 0,
    NetworkReady = 1,
    BrokerSubscribed = 2,
    Streaming = 3,
    Stopped = 4,
}

impl OperationalState {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 5;

    /// Convert a table index back to a state.  Out-of-range indices are a
    /// bug (debug assert); release builds fall back to `Stopped`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Initializing,
            1 => Self::NetworkReady,
            2 => Self::BrokerSubscribed,
            3 => Self::Streaming,
            4 => Self::Stopped,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Stopped
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut LifecycleContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut LifecycleContext) -> Option<OperationalState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: OperationalState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

/// A completed move between two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OperationalState,
    pub to: OperationalState,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `OperationalState as usize`.
    table: [StateDescriptor; OperationalState::COUNT],
    current: usize,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; OperationalState::COUNT], initial: OperationalState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut LifecycleContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.  Returns the transition taken, if any.
    pub fn tick(&mut self, ctx: &mut LifecycleContext) -> Option<Transition> {
        let next = (self.table[self.current].on_update)(ctx)?;
        Some(self.transition(next, ctx))
    }

    /// The current state's identity.
    pub fn current_state(&self) -> OperationalState {
        OperationalState::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next: OperationalState, ctx: &mut LifecycleContext) -> Transition {
        let from = self.current_state();
        let next_idx = next as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }

        Transition { from, to: next }
    }
}
