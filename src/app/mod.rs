//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the rules of the tank-level agent: lifecycle
//! orchestration, command handling, publish retry and quota.  All
//! interaction with hardware and the broker happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod backoff;
pub mod budget;
pub mod commands;
pub mod events;
pub mod inbox;
pub mod ports;
pub mod service;
