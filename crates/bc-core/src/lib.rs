//! bindcheck core library
//!
//! This library provides the core functionality of the harness:
//! - Address spec parsing, canonicalization and allow-list matching
//! - Socket table inspection
//! - Target process lifecycle
//! - The JSON-RPC transport and access-control probe
//! - The scenario catalog, runners and report
//!
//! The binary entry point is in `main.rs`.

pub mod addr;
pub mod capabilities;
pub mod collect;
pub mod config;
pub mod exit_codes;
pub mod logging;
pub mod node;
pub mod rpc;
pub mod scenario;

// Stand-in target for end-to-end tests
#[cfg(any(test, feature = "test-utils"))]
pub mod fake_node;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
