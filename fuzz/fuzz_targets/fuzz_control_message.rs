//! Fuzz target: inbound control messages
//!
//! Splits the input into a topic and a payload, pushes it through the
//! command inbox and parses the result.  Invariants checked:
//! - No panics for any topic or payload
//! - Stored payloads never exceed `MAX_PAYLOAD_LEN`
//! - Only the exact payloads `ON` and `OFF` parse as commands
//!
//! cargo fuzz run fuzz_control_message

#![no_main]

use libfuzzer_sys::fuzz_target;
use tanklevel::app::commands::ControlCommand;
use tanklevel::app::inbox::{InboundMessage, MAX_PAYLOAD_LEN};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let mid = usize::from(split).min(rest.len());
    let (topic, payload) = rest.split_at(mid);
    let topic = String::from_utf8_lossy(topic);

    let msg = InboundMessage::new(&topic, payload);
    assert!(msg.payload.len() <= MAX_PAYLOAD_LEN);
    if payload.len() > MAX_PAYLOAD_LEN {
        assert!(msg.truncated);
    }

    match ControlCommand::parse(&msg.payload) {
        ControlCommand::IndicatorOn => assert_eq!(payload, b"ON"),
        ControlCommand::IndicatorOff => assert_eq!(payload, b"OFF"),
        ControlCommand::Unrecognized(_) => {}
    }
});
