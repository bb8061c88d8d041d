//! Host capability detection.
//!
//! Some scenarios need more than a loopback IPv4 stack: socket-table
//! introspection, a bindable `::1`, or a second loopback address. These are
//! probed once per run and scenarios whose requirements are unmet are
//! skipped instead of failed.

mod detect;

pub use detect::{
    detect_capabilities, probe_ipv6_loopback, probe_local_bind, HostCapabilities, Requirement,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::SocketInspector;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_detected_capabilities_gate_requirements() {
        let caps = detect_capabilities(&SocketInspector::new(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(caps.other_loopback);
        assert_eq!(caps.other_loopback, probe_local_bind(caps.other_loopback_ip));
        assert_eq!(caps.ipv6_loopback, probe_ipv6_loopback());
        assert_eq!(caps.unmet(&[Requirement::OtherLoopback]), None);
    }
}
