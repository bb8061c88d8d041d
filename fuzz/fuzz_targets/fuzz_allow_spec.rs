//! Fuzz target for allow-list entry parsing.
//!
//! Tests that subnet parsing handles arbitrary input without panicking and
//! that every parsed network contains its own address.

#![no_main]

use bc_core::addr::AllowSpec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(allow) = AllowSpec::parse(data) {
        assert!(allow.contains(allow.network()));
    }
});
