//! Fuzz target for address spec parsing.
//!
//! Parsing must never panic, and every accepted spec must print to a form
//! that parses back to the same canonical address.

#![no_main]

use arbitrary::Arbitrary;
use bc_core::addr::canonicalize;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    spec: &'a str,
    default_port: u16,
}

fuzz_target!(|input: Input<'_>| {
    let Ok(addr) = canonicalize(input.spec, input.default_port) else {
        return;
    };
    if addr.port() == 0 {
        return;
    }
    let reparsed = canonicalize(&addr.to_string(), 1).expect("canonical form must reparse");
    assert_eq!(reparsed, addr);
});
