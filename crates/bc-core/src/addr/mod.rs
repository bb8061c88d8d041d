//! Address codec: bind specs, canonical socket addresses, allow-list networks.
//!
//! Three textual forms flow through the harness:
//! - bind specs given to the target (`127.0.0.1`, `[::1]:8332`, `::1`)
//! - allow-list entries (`127.0.0.1`, `10.0.0.0/8`, `192.168.0.0/255.255.0.0`)
//! - the kernel's hex encoding of socket endpoints (`0100007F:1F90`)
//!
//! All of them end up as a [`CanonicalAddress`], whose equality is exact and
//! family-sensitive. IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are folded
//! to IPv4 on construction so both sides of a comparison agree on family.

mod allow;
mod canonical;
mod spec;

pub use allow::AllowSpec;
pub use canonical::{decode_proc_net_endpoint, AddressFamily, BindSet, CanonicalAddress};
pub use spec::AddressSpec;

use thiserror::Error;

/// Errors from parsing address literals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("empty address")]
    Empty,

    #[error("unterminated '[' in '{input}'")]
    UnterminatedBracket { input: String },

    #[error("brackets are only valid around IPv6 literals: '{input}'")]
    BracketedIpv4 { input: String },

    #[error("'{input}' is not an IPv4 or IPv6 literal")]
    InvalidHost { input: String },

    #[error("unbracketed IPv6 literal with a port is ambiguous: '{input}'")]
    AmbiguousIpv6Port { input: String },

    #[error("invalid port in '{input}'")]
    InvalidPort { input: String },

    #[error("port 0 is not a bindable port: '{input}'")]
    PortZero { input: String },

    #[error("unexpected text after ']' in '{input}'")]
    TrailingText { input: String },

    #[error("invalid network mask in '{input}'")]
    InvalidMask { input: String },

    #[error("malformed kernel socket endpoint '{input}'")]
    InvalidHexEndpoint { input: String },
}

impl AddrError {
    /// The literal that failed to parse (empty for [`AddrError::Empty`]).
    pub fn input(&self) -> &str {
        match self {
            AddrError::Empty => "",
            AddrError::UnterminatedBracket { input }
            | AddrError::BracketedIpv4 { input }
            | AddrError::InvalidHost { input }
            | AddrError::AmbiguousIpv6Port { input }
            | AddrError::InvalidPort { input }
            | AddrError::PortZero { input }
            | AddrError::TrailingText { input }
            | AddrError::InvalidMask { input }
            | AddrError::InvalidHexEndpoint { input } => input,
        }
    }
}

impl From<AddrError> for bc_common::Error {
    fn from(err: AddrError) -> Self {
        bc_common::Error::MalformedAddress {
            input: err.input().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Exact set comparison. No leniency: `[::]` never matches `0.0.0.0`.
pub fn equal_sets(actual: &BindSet, expected: &BindSet) -> bool {
    actual == expected
}

/// Parse a spec and apply the default port in one step.
pub fn canonicalize(spec: &str, default_port: u16) -> Result<CanonicalAddress, AddrError> {
    Ok(spec.parse::<AddressSpec>()?.to_canonical(default_port))
}
