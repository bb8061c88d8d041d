//! Fuzz target for TOML configuration parsing and validation.

#![no_main]

use bc_core::config::{validate_config, HarnessConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Should never panic, only return an error
    if let Ok(config) = toml::from_str::<HarnessConfig>(data) {
        let _ = validate_config(&config);
    }
});
