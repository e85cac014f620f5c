//! Fuzz target: persisted and bundled config decoding
//!
//! Feeds arbitrary bytes to the NVS blob decoder and the JSON parser.
//! Invariants checked:
//! - No panics under any byte sequence
//! - Anything that decodes successfully also validates
//!
//! cargo fuzz run fuzz_config_blob

#![no_main]

use libfuzzer_sys::fuzz_target;
use tanklevel::adapters::nvs::NvsConfigStore;
use tanklevel::app::ports::ConfigPort;
use tanklevel::config::AgentConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(store) = NvsConfigStore::new() else {
        return;
    };
    store.sim_write_raw(data);
    if let Ok(cfg) = store.load() {
        assert!(cfg.validate().is_ok(), "decoded blob must be valid");
    }

    if let Ok(json) = core::str::from_utf8(data) {
        if let Ok(cfg) = AgentConfig::from_json(json) {
            assert!(cfg.validate().is_ok(), "parsed JSON must be valid");
        }
    }
});
