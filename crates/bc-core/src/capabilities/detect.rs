//! Capability detection implementation.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, TcpListener};

use serde::Serialize;
use tracing::{debug, info};

use crate::collect::SocketInspector;

/// Something a scenario needs from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Requirement {
    /// A local IPv6 stack (`::1` can be bound).
    Ipv6,
    /// The secondary loopback source address can be bound.
    OtherLoopback,
    /// The socket table of another process can be read.
    Introspection,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Ipv6 => write!(f, "ipv6"),
            Requirement::OtherLoopback => write!(f, "other-loopback"),
            Requirement::Introspection => write!(f, "introspection"),
        }
    }
}

/// What this host can do, detected once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostCapabilities {
    /// Operating system (linux, macos, ...).
    pub os: String,

    /// Socket-table introspection is available.
    pub socket_introspection: bool,

    /// `[::1]:0` can be bound.
    pub ipv6_loopback: bool,

    /// The configured secondary loopback address.
    pub other_loopback_ip: IpAddr,

    /// `other_loopback_ip:0` can be bound.
    pub other_loopback: bool,

    /// Timestamp when capabilities were detected.
    pub detected_at: String,
}

impl HostCapabilities {
    /// Whether a single requirement is satisfied.
    pub fn satisfies(&self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::Ipv6 => self.ipv6_loopback,
            Requirement::OtherLoopback => self.other_loopback,
            Requirement::Introspection => self.socket_introspection,
        }
    }

    /// The skip reason for the first unmet requirement, if any.
    pub fn unmet(&self, requirements: &[Requirement]) -> Option<String> {
        requirements
            .iter()
            .find(|r| !self.satisfies(**r))
            .map(|r| self.reason(*r))
    }

    fn reason(&self, requirement: Requirement) -> String {
        match requirement {
            Requirement::Ipv6 => "no IPv6 on this host ([::1] cannot be bound)".to_string(),
            Requirement::OtherLoopback => format!(
                "loopback address {} is not usable on this host",
                self.other_loopback_ip
            ),
            Requirement::Introspection => format!(
                "socket table introspection is not supported on {}",
                self.os
            ),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Platform: {} | Introspection: {} | IPv6: {} | {}: {}",
            self.os,
            yes_no(self.socket_introspection),
            yes_no(self.ipv6_loopback),
            self.other_loopback_ip,
            yes_no(self.other_loopback),
        )
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Detect host capabilities.
pub fn detect_capabilities(
    inspector: &SocketInspector,
    other_loopback_ip: IpAddr,
) -> HostCapabilities {
    info!("detecting host capabilities");

    let caps = HostCapabilities {
        os: std::env::consts::OS.to_string(),
        socket_introspection: inspector.is_supported(),
        ipv6_loopback: probe_ipv6_loopback(),
        other_loopback_ip,
        other_loopback: probe_local_bind(other_loopback_ip),
        detected_at: chrono::Utc::now().to_rfc3339(),
    };

    info!(summary = %caps.summary(), "capability detection complete");
    caps
}

/// Whether `::1` can be bound on an ephemeral port.
pub fn probe_ipv6_loopback() -> bool {
    probe_local_bind(IpAddr::V6(Ipv6Addr::LOCALHOST))
}

/// Whether `ip` can be bound on an ephemeral port.
pub fn probe_local_bind(ip: IpAddr) -> bool {
    match TcpListener::bind(SocketAddr::new(ip, 0)) {
        Ok(_) => true,
        Err(err) => {
            debug!(%ip, error = %err, "local bind probe failed");
            false
        }
    }
}
