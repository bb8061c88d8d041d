//! Fuzz target for /proc/net/tcp{,6} parsing.
//!
//! Tests that socket table parsing handles arbitrary input without panicking.

#![no_main]

use bc_core::collect::parse_proc_net_tcp_content;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = parse_proc_net_tcp_content(data, false);
    let _ = parse_proc_net_tcp_content(data, true);
});
