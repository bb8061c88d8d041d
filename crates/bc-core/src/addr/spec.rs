//! Bind specs as written on a target's command line.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::{AddrError, CanonicalAddress};

/// A host literal with an optional port.
///
/// Accepted forms:
/// - `a.b.c.d` and `a.b.c.d:port`
/// - `[v6]` and `[v6]:port`
/// - a bare IPv6 literal (never carries a port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSpec {
    host: IpAddr,
    port: Option<u16>,
}

impl AddressSpec {
    pub fn new(host: IpAddr, port: Option<u16>) -> Self {
        AddressSpec { host, port }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Apply `default_port` when no port was given.
    pub fn to_canonical(&self, default_port: u16) -> CanonicalAddress {
        CanonicalAddress::new(self.host, self.port.unwrap_or(default_port))
    }

    /// Parse a spec. Equivalent to `s.parse()`.
    pub fn parse(s: &str) -> Result<Self, AddrError> {
        s.parse()
    }
}

impl FromStr for AddressSpec {
    type Err = AddrError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(AddrError::Empty);
        }

        if let Some(rest) = input.strip_prefix('[') {
            let Some((inner, tail)) = rest.split_once(']') else {
                return Err(AddrError::UnterminatedBracket {
                    input: input.to_string(),
                });
            };
            let host = match inner.parse::<Ipv6Addr>() {
                Ok(v6) => IpAddr::V6(v6),
                Err(_) if inner.parse::<Ipv4Addr>().is_ok() => {
                    return Err(AddrError::BracketedIpv4 {
                        input: input.to_string(),
                    })
                }
                Err(_) => {
                    return Err(AddrError::InvalidHost {
                        input: input.to_string(),
                    })
                }
            };
            let port = if tail.is_empty() {
                None
            } else if let Some(port) = tail.strip_prefix(':') {
                Some(parse_port(port, input)?)
            } else {
                return Err(AddrError::TrailingText {
                    input: input.to_string(),
                });
            };
            return Ok(AddressSpec { host, port });
        }

        match input.matches(':').count() {
            0 => {
                let v4 = parse_ipv4_host(input, input)?;
                Ok(AddressSpec {
                    host: IpAddr::V4(v4),
                    port: None,
                })
            }
            1 => {
                let (host, port) = input.split_once(':').unwrap_or((input, ""));
                let v4 = parse_ipv4_host(host, input)?;
                Ok(AddressSpec {
                    host: IpAddr::V4(v4),
                    port: Some(parse_port(port, input)?),
                })
            }
            // Two or more colons: the whole string must be an IPv6 literal.
            _ => match input.parse::<Ipv6Addr>() {
                Ok(v6) => Ok(AddressSpec {
                    host: IpAddr::V6(v6),
                    port: None,
                }),
                Err(_) => Err(AddrError::AmbiguousIpv6Port {
                    input: input.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.host, self.port) {
            (IpAddr::V4(v4), None) => write!(f, "{v4}"),
            (IpAddr::V4(v4), Some(port)) => write!(f, "{v4}:{port}"),
            (IpAddr::V6(v6), None) => write!(f, "[{v6}]"),
            (IpAddr::V6(v6), Some(port)) => write!(f, "[{v6}]:{port}"),
        }
    }
}

fn parse_ipv4_host(host: &str, input: &str) -> Result<Ipv4Addr, AddrError> {
    host.parse::<Ipv4Addr>().map_err(|_| AddrError::InvalidHost {
        input: input.to_string(),
    })
}

fn parse_port(port: &str, input: &str) -> Result<u16, AddrError> {
    // u16::from_str accepts a leading '+'
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddrError::InvalidPort {
            input: input.to_string(),
        });
    }
    match port.parse::<u16>() {
        Ok(0) => Err(AddrError::PortZero {
            input: input.to_string(),
        }),
        Ok(p) => Ok(p),
        Err(_) => Err(AddrError::InvalidPort {
            input: input.to_string(),
        }),
    }
}
