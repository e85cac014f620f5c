//! Command inbox: bounded channel between the transport's receive path
//! and the control loop.
//!
//! ```text
//! ┌────────────────┐  InboundMessage  ┌──────────────┐
//! │ MQTT callback  │─────────────────▶│ ControlLoop  │
//! │ (client task)  │  try_send/drop   │ (per-cycle   │
//! └────────────────┘                  │  drain)      │
//!                                     └──────────────┘
//! ```
//!
//! Uses an `embassy-sync` channel over a critical-section mutex, so the
//! producer may run on another FreeRTOS task (or test thread) while the
//! loop drains without blocking.  When the inbox is full the newest
//! message is dropped and counted.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

/// Longest topic kept verbatim.
pub const MAX_TOPIC_LEN: usize = 128;

/// Longest payload kept verbatim.  Commands are a few bytes.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Channel depth for inbound messages.
const INBOX_DEPTH: usize = 8;

/// One message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: heapless::String<MAX_TOPIC_LEN>,
    pub payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
    /// Topic or payload did not fit and was cut short.
    pub truncated: bool,
}

impl InboundMessage {
    pub fn new(topic: &str, payload: &[u8]) -> Self {
        let mut truncated = false;

        let mut t = heapless::String::new();
        for ch in topic.chars() {
            if t.push(ch).is_err() {
                truncated = true;
                break;
            }
        }

        let mut p = heapless::Vec::new();
        let keep = payload.len().min(MAX_PAYLOAD_LEN);
        // Cannot fail: `keep` never exceeds capacity.
        let _ = p.extend_from_slice(&payload[..keep]);
        if keep < payload.len() {
            truncated = true;
        }

        Self {
            topic: t,
            payload: p,
            truncated,
        }
    }
}

/// Bounded multi-producer inbox drained by the control loop.
pub struct CommandInbox {
    channel: Channel<CriticalSectionRawMutex, InboundMessage, INBOX_DEPTH>,
    dropped: AtomicU32,
}

/// Shared handle given to the transport on `subscribe`.
pub type InboxHandle = Arc<CommandInbox>;

impl Default for CommandInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandInbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Allocate a fresh shared inbox.
    pub fn handle() -> InboxHandle {
        Arc::new(Self::new())
    }

    /// Producer side.  Never blocks; returns `false` if the message was dropped.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        match self.channel.try_send(InboundMessage::new(topic, payload)) {
            Ok(()) => true,
            Err(_) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("inbox: full, dropped message on '{}' ({} dropped so far)", topic, n);
                false
            }
        }
    }

    /// Consumer side.  Returns `None` when nothing is pending.
    pub fn try_next(&self) -> Option<InboundMessage> {
        self.channel.try_receive().ok()
    }

    /// Messages dropped because the inbox was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}
