//! Allow-list networks.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::canonical::fold_mapped;
use super::AddrError;

/// One allow-list entry: a network address and prefix length.
///
/// Accepted forms: `host`, `host/prefix`, `host/netmask`, with optional
/// brackets around an IPv6 host. A bare host is a single-address network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowSpec {
    network: IpAddr,
    prefix: u8,
}

impl AllowSpec {
    pub fn parse(s: &str) -> Result<Self, AddrError> {
        s.parse()
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `ip` falls inside this network. Mapped IPv6 peers are matched
    /// as IPv4.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, fold_mapped(ip)) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = v4_mask(self.prefix);
                u32::from(net) & mask == u32::from(addr) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = v6_mask(self.prefix);
                u128::from(net) & mask == u128::from(addr) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for AllowSpec {
    type Err = AddrError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(AddrError::Empty);
        }

        let (host, mask) = match input.split_once('/') {
            Some((host, mask)) => (host, Some(mask)),
            None => (input, None),
        };

        let host_literal = match host.strip_prefix('[') {
            Some(rest) => rest.strip_suffix(']').ok_or_else(|| AddrError::UnterminatedBracket {
                input: input.to_string(),
            })?,
            None => host,
        };
        let parsed: IpAddr = host_literal.parse().map_err(|_| AddrError::InvalidHost {
            input: input.to_string(),
        })?;
        if host_literal.len() != host.len() && parsed.is_ipv4() {
            return Err(AddrError::BracketedIpv4 {
                input: input.to_string(),
            });
        }

        let invalid_mask = || AddrError::InvalidMask {
            input: input.to_string(),
        };
        let max = if parsed.is_ipv4() { 32 } else { 128 };
        let mut prefix = match mask {
            None => max,
            Some(m) if !m.is_empty() && m.bytes().all(|b| b.is_ascii_digit()) => {
                let p: u8 = m.parse().map_err(|_| invalid_mask())?;
                if p > max {
                    return Err(invalid_mask());
                }
                p
            }
            Some(m) => netmask_prefix(parsed, m).ok_or_else(invalid_mask)?,
        };

        // Mapped IPv6 networks that stay inside ::ffff:0:0/96 become IPv4 networks.
        let mut network = parsed;
        if let IpAddr::V6(v6) = parsed {
            if let Some(v4) = v6.to_ipv4_mapped() {
                if prefix >= 96 {
                    network = IpAddr::V4(v4);
                    prefix -= 96;
                }
            }
        }

        let network = match network {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(prefix))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(prefix))),
        };
        Ok(AllowSpec { network, prefix })
    }
}

impl fmt::Display for AllowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn v4_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn v6_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

/// Prefix length of a dotted/colon netmask of the same family, if contiguous.
fn netmask_prefix(host: IpAddr, mask: &str) -> Option<u8> {
    match (host, mask.parse::<IpAddr>().ok()?) {
        (IpAddr::V4(_), IpAddr::V4(m)) => {
            let bits = u32::from(m);
            let ones = bits.leading_ones();
            (bits == v4_mask(ones as u8)).then_some(ones as u8)
        }
        (IpAddr::V6(_), IpAddr::V6(m)) => {
            let bits = u128::from(m);
            let ones = bits.leading_ones();
            (bits == v6_mask(ones as u8)).then_some(ones as u8)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_single_host() {
        let spec = AllowSpec::parse("127.0.0.2").unwrap();
        assert_eq!(spec.prefix(), 32);
        assert!(spec.contains(ip("127.0.0.2")));
        assert!(!spec.contains(ip("127.0.0.1")));
    }

    #[test]
    fn test_cidr_and_netmask_agree() {
        let cidr = AllowSpec::parse("10.1.2.3/8").unwrap();
        let mask = AllowSpec::parse("10.1.2.3/255.0.0.0").unwrap();
        assert_eq!(cidr, mask);
        assert_eq!(cidr.to_string(), "10.0.0.0/8");
        assert!(cidr.contains(ip("10.200.0.1")));
        assert!(!cidr.contains(ip("11.0.0.1")));
    }

    #[test]
    fn test_ipv6_forms() {
        let spec = AllowSpec::parse("[::1]").unwrap();
        assert_eq!(spec.prefix(), 128);
        assert!(spec.contains(ip("::1")));
        assert!(!spec.contains(ip("127.0.0.1")));

        let spec = AllowSpec::parse("fd00::/8").unwrap();
        assert!(spec.contains(ip("fd12:3456::1")));
    }

    #[test]
    fn test_zero_prefix_matches_family() {
        let any4 = AllowSpec::parse("0.0.0.0/0").unwrap();
        assert!(any4.contains(ip("1.1.1.1")));
        assert!(!any4.contains(ip("::1")));
        assert!(AllowSpec::parse("::/0").unwrap().contains(ip("2001:db8::1")));
    }

    #[test]
    fn test_mapped_peer_matches_ipv4_network() {
        let spec = AllowSpec::parse("127.0.0.2").unwrap();
        assert!(spec.contains(ip("::ffff:127.0.0.2")));

        let mapped_net = AllowSpec::parse("::ffff:192.168.0.0/112").unwrap();
        assert_eq!(mapped_net.to_string(), "192.168.0.0/16");
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert_eq!(AllowSpec::parse(""), Err(AddrError::Empty));
        for bad in ["10.0.0.0/33", "10.0.0.0/255.0.255.0", "10.0.0.0/", "10.0.0.0/ffff::"] {
            assert!(
                matches!(AllowSpec::parse(bad), Err(AddrError::InvalidMask { .. })),
                "{bad}"
            );
        }
        assert!(matches!(
            AllowSpec::parse("example.com"),
            Err(AddrError::InvalidHost { .. })
        ));
        assert!(matches!(
            AllowSpec::parse("[127.0.0.1]"),
            Err(AddrError::BracketedIpv4 { .. })
        ));
        assert!(matches!(
            AllowSpec::parse("[::1"),
            Err(AddrError::UnterminatedBracket { .. })
        ));
    }
}
