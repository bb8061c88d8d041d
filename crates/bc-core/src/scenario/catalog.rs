//! The fixed, ordered scenario list.

use std::net::IpAddr;

use super::{AllowlistScenario, BindScenario, ExpectedOutcome, Scenario};
use crate::addr::AddressSpec;
use crate::capabilities::Requirement;
use crate::config::CatalogConfig;

/// Alternate RPC ports used by the explicit-port scenarios.
pub const ALT_PORT_A: u16 = 32171;
pub const ALT_PORT_B: u16 = 32172;

/// Ordered scenario list. Expected sets leave ports implicit; runners fill in
/// the configured RPC port.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    /// The standard catalog.
    ///
    /// `other_loopback` is a loopback address other than `127.0.0.1`, used as
    /// a non-default bind address and as the probe origin. `denied_allow`
    /// is an allow-list entry that must not cover it.
    pub fn standard(other_loopback: IpAddr, denied_allow: &str) -> Self {
        let other = AddressSpec::new(other_loopback, None).to_string();
        let alt_a = format!("127.0.0.1:{ALT_PORT_A}");
        let alt_b = format!("127.0.0.1:{ALT_PORT_B}");
        let (other, alt_a, alt_b) = (other.as_str(), alt_a.as_str(), alt_b.as_str());

        let scenarios = vec![
            bind(
                "default-loopback-dual-stack",
                &[],
                "127.0.0.1",
                &[],
                &["127.0.0.1", "[::1]"],
                &[Requirement::Ipv6],
            ),
            bind(
                "allowip-widens-to-any",
                &["127.0.0.1"],
                "127.0.0.1",
                &[],
                &["[::]"],
                &[Requirement::Ipv6],
            ),
            bind(
                "explicit-ipv4-loopback",
                &["127.0.0.1"],
                "127.0.0.1",
                &["127.0.0.1"],
                &["127.0.0.1"],
                &[],
            ),
            bind(
                "explicit-ipv4-alt-port",
                &["127.0.0.1"],
                alt_a,
                &[alt_a],
                &[alt_a],
                &[],
            ),
            bind(
                "explicit-ipv4-multi-port",
                &["127.0.0.1"],
                alt_a,
                &[alt_a, alt_b],
                &[alt_a, alt_b],
                &[],
            ),
            bind(
                "explicit-ipv6-loopback",
                &["[::1]"],
                "[::1]",
                &["[::1]"],
                &["[::1]"],
                &[Requirement::Ipv6],
            ),
            bind(
                "explicit-dual-loopback",
                &["127.0.0.1"],
                "127.0.0.1",
                &["127.0.0.1", "[::1]"],
                &["127.0.0.1", "[::1]"],
                &[Requirement::Ipv6],
            ),
            bind(
                "explicit-other-loopback",
                &[other],
                other,
                &[other],
                &[other],
                &[Requirement::OtherLoopback],
            ),
            allowlist(
                "allowip-permits-source",
                &[other],
                other_loopback,
                other,
                ExpectedOutcome::Permit,
            ),
            allowlist(
                "allowip-denies-source",
                &[denied_allow],
                other_loopback,
                other,
                ExpectedOutcome::ConfirmedDeny,
            ),
        ];
        ScenarioCatalog { scenarios }
    }

    /// Standard catalog from the `[catalog]` config section.
    ///
    /// The section is validated before this is called; an unparsable
    /// loopback address falls back to `127.0.0.2`.
    pub fn from_config(config: &CatalogConfig) -> Self {
        let other = config
            .other_loopback_ip
            .parse()
            .unwrap_or(IpAddr::from([127, 0, 0, 2]));
        Self::standard(other, &config.denied_allow_ip)
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name()).collect()
    }

    /// Keep only the named scenarios, in catalog order.
    ///
    /// Unknown names are returned as the error so the CLI can report them.
    pub fn filter(self, only: &[String]) -> Result<Self, Vec<String>> {
        if only.is_empty() {
            return Ok(self);
        }
        let unknown: Vec<String> = only
            .iter()
            .filter(|name| self.get(name).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(unknown);
        }
        let scenarios = self
            .scenarios
            .into_iter()
            .filter(|s| only.iter().any(|name| name == s.name()))
            .collect();
        Ok(ScenarioCatalog { scenarios })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn bind(
    name: &str,
    allow_list: &[&str],
    connect_to: &str,
    binds: &[&str],
    expected: &[&str],
    requires: &[Requirement],
) -> Scenario {
    Scenario::Bind(BindScenario {
        name: name.to_string(),
        allow_list: strings(allow_list),
        connect_to: connect_to.to_string(),
        binds: strings(binds),
        expected: strings(expected),
        requires: requires.to_vec(),
    })
}

fn allowlist(
    name: &str,
    allow_list: &[&str],
    source: IpAddr,
    destination: &str,
    expected: ExpectedOutcome,
) -> Scenario {
    Scenario::Allowlist(AllowlistScenario {
        name: name.to_string(),
        allow_list: strings(allow_list),
        source,
        destination: destination.to_string(),
        expected,
        requires: vec![Requirement::OtherLoopback],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{canonicalize, BindSet, CanonicalAddress};

    const D: u16 = 18443;

    fn catalog() -> ScenarioCatalog {
        ScenarioCatalog::standard(IpAddr::from([127, 0, 0, 2]), "1.1.1.1")
    }

    fn expected_set(name: &str) -> BindSet {
        match catalog().get(name).unwrap() {
            Scenario::Bind(s) => s
                .expected
                .iter()
                .map(|spec| canonicalize(spec, D).unwrap())
                .collect(),
            other => panic!("{name} is not a bind scenario: {other:?}"),
        }
    }

    #[test]
    fn test_catalog_order() {
        assert_eq!(
            catalog().names(),
            vec![
                "default-loopback-dual-stack",
                "allowip-widens-to-any",
                "explicit-ipv4-loopback",
                "explicit-ipv4-alt-port",
                "explicit-ipv4-multi-port",
                "explicit-ipv6-loopback",
                "explicit-dual-loopback",
                "explicit-other-loopback",
                "allowip-permits-source",
                "allowip-denies-source",
            ]
        );
    }

    #[test]
    fn test_default_binds_both_loopbacks() {
        let expected: BindSet = [
            CanonicalAddress::ipv4_loopback(D),
            CanonicalAddress::ipv6_loopback(D),
        ]
        .into_iter()
        .collect();
        assert_eq!(expected_set("default-loopback-dual-stack"), expected);
    }

    #[test]
    fn test_allowip_without_bind_is_ipv6_any_only() {
        let expected: BindSet = [CanonicalAddress::ipv6_any(D)].into_iter().collect();
        assert_eq!(expected_set("allowip-widens-to-any"), expected);
        assert!(!expected_set("allowip-widens-to-any").contains(&CanonicalAddress::ipv4_any(D)));
    }

    #[test]
    fn test_multi_port_keeps_explicit_ports() {
        let expected: BindSet = [
            CanonicalAddress::ipv4_loopback(ALT_PORT_A),
            CanonicalAddress::ipv4_loopback(ALT_PORT_B),
        ]
        .into_iter()
        .collect();
        assert_eq!(expected_set("explicit-ipv4-multi-port"), expected);
    }

    #[test]
    fn test_deny_scenario_shape() {
        match catalog().get("allowip-denies-source").unwrap() {
            Scenario::Allowlist(s) => {
                assert_eq!(s.allow_list, vec!["1.1.1.1"]);
                assert_eq!(s.source, IpAddr::from([127, 0, 0, 2]));
                assert_eq!(s.destination, "127.0.0.2");
                assert_eq!(s.expected, ExpectedOutcome::ConfirmedDeny);
                assert_eq!(s.requires, vec![Requirement::OtherLoopback]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_every_bind_scenario_needs_introspection() {
        for s in catalog().scenarios() {
            if let Scenario::Bind(_) = s {
                assert!(s.requirements().contains(&Requirement::Introspection));
            }
        }
    }

    #[test]
    fn test_all_literals_parse() {
        for s in catalog().scenarios() {
            match s {
                Scenario::Bind(b) => {
                    for spec in b.expected.iter().chain(&b.binds).chain([&b.connect_to]) {
                        assert!(canonicalize(spec, D).is_ok(), "{spec}");
                    }
                }
                Scenario::Allowlist(a) => assert!(canonicalize(&a.destination, D).is_ok()),
            }
        }
    }

    #[test]
    fn test_ipv6_other_loopback_is_bracketed() {
        let c = ScenarioCatalog::standard("::1".parse().unwrap(), "1.1.1.1");
        match c.get("explicit-other-loopback").unwrap() {
            Scenario::Bind(s) => assert_eq!(s.binds, vec!["[::1]"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_filter_keeps_catalog_order() {
        let only = vec![
            "allowip-denies-source".to_string(),
            "explicit-ipv4-loopback".to_string(),
        ];
        let filtered = catalog().filter(&only).unwrap();
        assert_eq!(
            filtered.names(),
            vec!["explicit-ipv4-loopback", "allowip-denies-source"]
        );
    }

    #[test]
    fn test_filter_reports_unknown_names() {
        let only = vec!["nope".to_string(), "explicit-ipv4-loopback".to_string()];
        assert_eq!(catalog().filter(&only).unwrap_err(), vec!["nope"]);
        assert_eq!(catalog().filter(&[]).unwrap().len(), 10);
    }
}
