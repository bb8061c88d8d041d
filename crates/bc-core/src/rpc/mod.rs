//! JSON-RPC over HTTP: the readiness transport and the access-control probe.
//!
//! The probe never unwinds: every way a status query can end is mapped to a
//! [`ProbeOutcome`], and only a `403 Forbidden` with a non-JSON body counts as
//! the target refusing the origin.

mod client;
pub mod http;

pub use client::{RpcClient, RpcCredentials, DEFAULT_RPC_TIMEOUT};

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Method used for readiness and access probes.
pub const STATUS_METHOD: &str = "getnetworkinfo";

/// Method asking the target to shut down.
pub const STOP_METHOD: &str = "stop";

/// RPC error code a target returns while still starting up.
pub const RPC_IN_WARMUP: i64 = -28;

/// Errors from a single JSON-RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("cannot bind local source address {source_ip}: {error}")]
    SourceBind { source_ip: IpAddr, error: io::Error },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Http(#[from] http::HttpError),

    #[error("HTTP {status} {reason}")]
    Status {
        status: u16,
        reason: String,
        body: String,
        json_body: bool,
    },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Nothing accepted the connection.
    pub fn is_not_listening(&self) -> bool {
        matches!(
            self,
            RpcError::Connect { source, .. } if source.kind() == io::ErrorKind::ConnectionRefused
        )
    }

    pub fn is_warming_up(&self) -> bool {
        matches!(self, RpcError::Rpc { code, .. } if *code == RPC_IN_WARMUP)
    }

    /// The target's access-control refusal: 403 with a non-JSON body.
    pub fn is_origin_denied(&self) -> bool {
        matches!(
            self,
            RpcError::Status {
                status: 403,
                json_body: false,
                ..
            }
        )
    }
}

/// How a status query from a given origin ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The query succeeded.
    Permit,
    /// The target refused the origin.
    ConfirmedDeny { signature: String },
    /// Anything else: refused connection, timeout, other status, garbage.
    Unclassified { reason: String },
}

impl ProbeOutcome {
    pub fn classify<T>(result: &Result<T, RpcError>) -> Self {
        match result {
            Ok(_) => ProbeOutcome::Permit,
            Err(
                err @ RpcError::Status {
                    status, reason, ..
                },
            ) if err.is_origin_denied() => ProbeOutcome::ConfirmedDeny {
                signature: format!("non-JSON HTTP response with '{status} {reason}' from server"),
            },
            Err(err) => ProbeOutcome::Unclassified {
                reason: err.to_string(),
            },
        }
    }

    /// Short label used in reports and mismatch messages.
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Permit => "permit",
            ProbeOutcome::ConfirmedDeny { .. } => "confirmed_deny",
            ProbeOutcome::Unclassified { .. } => "unclassified",
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Permit => write!(f, "permit"),
            ProbeOutcome::ConfirmedDeny { signature } => write!(f, "confirmed_deny ({signature})"),
            ProbeOutcome::Unclassified { reason } => write!(f, "unclassified ({reason})"),
        }
    }
}
