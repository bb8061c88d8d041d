//! Port assignment for target processes.
//!
//! Ports are spread across a fixed window by a per-invocation seed so two
//! harness runs on the same host do not fight over the same RPC port.

use serde::Serialize;

use crate::config::RpcConfig;

/// Lowest port handed out.
pub const PORT_MIN: u16 = 11000;

/// Width of the window reserved for each port kind.
pub const PORT_RANGE: u16 = 5000;

/// Node slots reserved per seed.
pub const MAX_NODES: u16 = 8;

/// Which window a port comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    P2p = 0,
    Rpc = 1,
}

/// Seed for port derivation, normally the harness pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSeed(pub u32);

impl PortSeed {
    pub fn from_current_process() -> Self {
        PortSeed(std::process::id())
    }

    /// Port for node slot `n` of the given kind.
    pub fn port(&self, kind: PortKind, n: u16) -> u16 {
        let n = u64::from(n % MAX_NODES);
        let spread = (u64::from(MAX_NODES) * u64::from(self.0)) % u64::from(PORT_RANGE - 1 - MAX_NODES);
        let port = u64::from(PORT_MIN) + u64::from(PORT_RANGE) * kind as u64 + n + spread;
        // Bounded by PORT_MIN + 2 * PORT_RANGE, well inside u16.
        port as u16
    }
}

/// Concrete ports for one harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortAssignment {
    pub rpc: u16,
    pub p2p: u16,
}

impl PortAssignment {
    /// Configured ports win; unset ones come from the seed.
    pub fn resolve(rpc: &RpcConfig, seed: PortSeed) -> Self {
        PortAssignment {
            rpc: rpc.port.unwrap_or_else(|| seed.port(PortKind::Rpc, 0)),
            p2p: rpc.p2p_port.unwrap_or_else(|| seed.port(PortKind::P2p, 0)),
        }
    }
}
