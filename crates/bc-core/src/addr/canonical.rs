//! Canonical socket addresses and bind sets.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Serialize, Serializer};

use super::AddrError;

/// Address family of a canonical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// A concrete (family, address bytes, port) triple.
///
/// IPv4-mapped IPv6 addresses are stored as IPv4. Two values are equal only
/// when family, bytes and port all match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalAddress {
    ip: IpAddr,
    port: u16,
}

impl CanonicalAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        CanonicalAddress {
            ip: fold_mapped(ip),
            port,
        }
    }

    pub fn ipv4_any(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    }

    pub fn ipv6_any(port: u16) -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    }

    pub fn ipv4_loopback(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    pub fn ipv6_loopback(port: u16) -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port)
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn family(&self) -> AddressFamily {
        match self.ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Raw address bytes (4 or 16).
    pub fn octets(&self) -> Vec<u8> {
        match self.ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }

    /// Lowercase hex of the address bytes, for diagnostics.
    pub fn to_hex(&self) -> String {
        self.octets().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn is_loopback(&self) -> bool {
        self.ip.is_loopback()
    }

    pub fn is_unspecified(&self) -> bool {
        self.ip.is_unspecified()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for CanonicalAddress {
    fn from(addr: SocketAddr) -> Self {
        CanonicalAddress::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(v4) => write!(f, "{v4}:{}", self.port),
            IpAddr::V6(v6) => write!(f, "[{v6}]:{}", self.port),
        }
    }
}

impl Serialize for CanonicalAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub(super) fn fold_mapped(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// Unordered, duplicate-free set of bound addresses.
///
/// Iteration order is sorted (IPv4 before IPv6) so reports are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindSet(BTreeSet<CanonicalAddress>);

impl BindSet {
    pub fn new() -> Self {
        BindSet(BTreeSet::new())
    }

    /// Returns false if the address was already present.
    pub fn insert(&mut self, addr: CanonicalAddress) -> bool {
        self.0.insert(addr)
    }

    pub fn contains(&self, addr: &CanonicalAddress) -> bool {
        self.0.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, CanonicalAddress> {
        self.0.iter()
    }

    /// Members of `self` absent from `other`.
    pub fn difference<'a>(&'a self, other: &'a BindSet) -> impl Iterator<Item = &'a CanonicalAddress> {
        self.0.difference(&other.0)
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<CanonicalAddress> for BindSet {
    fn from_iter<I: IntoIterator<Item = CanonicalAddress>>(iter: I) -> Self {
        BindSet(iter.into_iter().collect())
    }
}

impl Extend<CanonicalAddress> for BindSet {
    fn extend<I: IntoIterator<Item = CanonicalAddress>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl<'a> IntoIterator for &'a BindSet {
    type Item = &'a CanonicalAddress;
    type IntoIter = btree_set::Iter<'a, CanonicalAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for BindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, addr) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{addr}")?;
        }
        write!(f, "}}")
    }
}

impl Serialize for BindSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

/// Decode a `/proc/net/tcp{,6}` endpoint such as `0100007F:1F90`.
///
/// The address is printed as 32-bit words in host byte order; the port is
/// plain big-endian hex.
pub fn decode_proc_net_endpoint(field: &str, is_ipv6: bool) -> Result<CanonicalAddress, AddrError> {
    let invalid = || AddrError::InvalidHexEndpoint {
        input: field.to_string(),
    };

    let (addr_hex, port_hex) = field.split_once(':').ok_or_else(invalid)?;
    // from_str_radix alone would take a sign, e.g. "+1F9".
    if port_hex.len() != 4 || !port_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let port = u16::from_str_radix(port_hex, 16).map_err(|_| invalid())?;

    let words = if is_ipv6 { 4 } else { 1 };
    if addr_hex.len() != words * 8 || !addr_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let mut bytes = [0u8; 16];
    for i in 0..words {
        let word = u32::from_str_radix(&addr_hex[i * 8..(i + 1) * 8], 16).map_err(|_| invalid())?;
        bytes[i * 4..(i + 1) * 4].copy_from_slice(&word.to_ne_bytes());
    }

    let ip = if is_ipv6 {
        IpAddr::V6(Ipv6Addr::from(bytes))
    } else {
        IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    };
    Ok(CanonicalAddress::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::AddressSpec;

    #[test]
    fn test_display_forms() {
        assert_eq!(CanonicalAddress::ipv4_loopback(8332).to_string(), "127.0.0.1:8332");
        assert_eq!(CanonicalAddress::ipv6_loopback(8332).to_string(), "[::1]:8332");
        assert_eq!(CanonicalAddress::ipv6_any(1).to_string(), "[::]:1");
        assert_eq!(CanonicalAddress::ipv4_any(1).to_string(), "0.0.0.0:1");
    }

    #[test]
    fn test_display_reparses_to_same_value() {
        for addr in [
            CanonicalAddress::ipv4_loopback(18443),
            CanonicalAddress::ipv6_any(32171),
            CanonicalAddress::new("fe80::1".parse().unwrap(), 7),
        ] {
            let reparsed = AddressSpec::parse(&addr.to_string()).unwrap().to_canonical(1);
            assert_eq!(reparsed, addr);
        }
    }

    #[test]
    fn test_any_addresses_differ_across_families() {
        assert_ne!(CanonicalAddress::ipv4_any(80), CanonicalAddress::ipv6_any(80));
        assert_eq!(CanonicalAddress::ipv4_any(80).octets(), vec![0; 4]);
        assert_eq!(CanonicalAddress::ipv6_any(80).octets(), vec![0; 16]);
    }

    #[test]
    fn test_mapped_folds_to_ipv4() {
        let mapped = CanonicalAddress::new("::ffff:127.0.0.2".parse().unwrap(), 5);
        assert_eq!(mapped.family(), AddressFamily::Ipv4);
        assert_eq!(mapped.to_string(), "127.0.0.2:5");
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(CanonicalAddress::ipv4_loopback(1).to_hex(), "7f000001");
        assert_eq!(
            CanonicalAddress::ipv6_loopback(1).to_hex(),
            "00000000000000000000000000000001"
        );
    }

    #[test]
    fn test_bind_set_dedupes_and_sorts() {
        let mut set = BindSet::new();
        assert!(set.insert(CanonicalAddress::ipv6_loopback(1)));
        assert!(set.insert(CanonicalAddress::ipv4_loopback(1)));
        assert!(!set.insert(CanonicalAddress::ipv4_loopback(1)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "{127.0.0.1:1, [::1]:1}");
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"["127.0.0.1:1","[::1]:1"]"#
        );
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn test_decode_ipv4_endpoint() {
        let addr = decode_proc_net_endpoint("0100007F:1F90", false).unwrap();
        assert_eq!(addr, CanonicalAddress::ipv4_loopback(8080));

        let addr = decode_proc_net_endpoint("0101A8C0:0035", false).unwrap();
        assert_eq!(addr.to_string(), "192.168.1.1:53");
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn test_decode_ipv6_endpoints() {
        let addr =
            decode_proc_net_endpoint("00000000000000000000000001000000:47DB", true).unwrap();
        assert_eq!(addr, CanonicalAddress::ipv6_loopback(18395));

        let addr =
            decode_proc_net_endpoint("00000000000000000000000000000000:7D6B", true).unwrap();
        assert_eq!(addr, CanonicalAddress::ipv6_any(32107));

        // ::ffff:127.0.0.1 as the kernel prints it
        let addr =
            decode_proc_net_endpoint("0000000000000000FFFF00000100007F:0050", true).unwrap();
        assert_eq!(addr, CanonicalAddress::ipv4_loopback(80));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for bad in ["", "0100007F", "0100007F:", "0100007:1F90", "ZZ00007F:1F90", "0100007F:1F9"] {
            assert!(decode_proc_net_endpoint(bad, false).is_err(), "{bad}");
        }
        assert!(decode_proc_net_endpoint("0100007F:1F90", true).is_err());
    }

    #[test]
    fn test_decode_rejects_signed_port() {
        assert!(matches!(
            decode_proc_net_endpoint("0100007F:+1F9", false),
            Err(AddrError::InvalidHexEndpoint { .. })
        ));
        assert!(decode_proc_net_endpoint("0100007F:-001", false).is_err());
    }
}
