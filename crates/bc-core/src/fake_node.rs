//! Minimal stand-in target for end-to-end tests.
//!
//! Speaks the generic preset's command line and reproduces the bind and
//! access-control policy the harness verifies:
//!
//! - no allow-list: bind `127.0.0.1` and `::1`, explicit binds are ignored
//! - allow-list without binds: bind `::` (dual-stack) then `0.0.0.0`, the
//!   latter usually failing with `EADDRINUSE`, which is ignored
//! - otherwise bind every requested spec
//!
//! `127.0.0.1` and `::1` are always admitted. Any other origin, including
//! other loopback addresses, must fall inside an allow-list entry or gets
//! `403 Forbidden` with an empty plain-text body.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::addr::{canonicalize, AddrError, AllowSpec};
use crate::rpc::{RpcCredentials, RPC_IN_WARMUP, STATUS_METHOD, STOP_METHOD};

const ACCEPT_IDLE: Duration = Duration::from_millis(10);

/// Command line of the fake node (generic preset dialect plus test knobs).
#[derive(Parser, Debug, Clone)]
#[command(name = "bc-fake-node", about = "Stand-in target for bindcheck tests")]
pub struct FakeNodeArgs {
    #[arg(long)]
    pub datadir: PathBuf,

    #[arg(long)]
    pub rpc_port: u16,

    #[arg(long, default_value = "bindcheck")]
    pub rpc_user: String,

    #[arg(long, default_value = "bindcheck")]
    pub rpc_password: String,

    #[arg(long)]
    pub disable_wallet: bool,

    #[arg(long)]
    pub no_listen: bool,

    #[arg(long = "rpc-allow-ip")]
    pub rpc_allow_ip: Vec<String>,

    #[arg(long = "rpc-bind")]
    pub rpc_bind: Vec<String>,

    /// Answer status queries with a warm-up error for this long.
    #[arg(long, default_value_t = 0)]
    pub startup_delay_ms: u64,

    /// Acknowledge `stop` but keep running, and ignore SIGTERM.
    #[arg(long)]
    pub hang_on_stop: bool,

    /// Also bind the wildcard addresses, regardless of policy.
    #[arg(long)]
    pub bind_extra_any: bool,
}

/// Errors that keep the fake node from starting.
#[derive(Debug, Error)]
pub enum FakeNodeError {
    #[error("invalid -rpcallowip subnet specification: {0}")]
    AllowEntry(#[source] AddrError),

    #[error("invalid -rpcbind address: {0}")]
    BindSpec(#[source] AddrError),

    #[error("unable to bind any endpoint for RPC server")]
    NothingBound,

    #[error("binding RPC on {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("starting HTTP server on {addr:?} failed: {reason}")]
    Serve {
        addr: Option<SocketAddr>,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A bound, not yet serving, fake node.
pub struct FakeNode {
    listeners: Vec<TcpListener>,
    allow: Vec<AllowSpec>,
    auth: String,
    warm_until: Instant,
    hang_on_stop: bool,
}

/// One endpoint to bind and whether failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoint {
    addr: SocketAddr,
    required: bool,
}

impl FakeNode {
    pub fn bind(args: &FakeNodeArgs) -> Result<Self, FakeNodeError> {
        let allow = args
            .rpc_allow_ip
            .iter()
            .map(|entry| AllowSpec::parse(entry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(FakeNodeError::AllowEntry)?;

        let mut endpoints = endpoints_for(args)?;
        if args.bind_extra_any {
            for ip in [IpAddr::V4(Ipv4Addr::UNSPECIFIED), IpAddr::V6(Ipv6Addr::UNSPECIFIED)] {
                endpoints.push(Endpoint {
                    addr: SocketAddr::new(ip, args.rpc_port),
                    required: false,
                });
            }
        }

        let mut listeners = Vec::new();
        for endpoint in endpoints {
            info!(addr = %endpoint.addr, "binding RPC");
            // Wildcard IPv6 stays dual-stack; explicit IPv6 binds do not.
            let only_v6 = endpoint.addr.is_ipv6() && !endpoint.addr.ip().is_unspecified();
            match listen(endpoint.addr, only_v6) {
                Ok(listener) => listeners.push(listener),
                Err(source) if endpoint.required => {
                    return Err(FakeNodeError::Bind {
                        addr: endpoint.addr,
                        source,
                    })
                }
                Err(err) => warn!(addr = %endpoint.addr, error = %err, "binding RPC failed"),
            }
        }
        if listeners.is_empty() {
            return Err(FakeNodeError::NothingBound);
        }

        Ok(FakeNode {
            listeners,
            allow,
            auth: RpcCredentials::new(&args.rpc_user, &args.rpc_password).header_value(),
            warm_until: Instant::now() + Duration::from_millis(args.startup_delay_ms),
            hang_on_stop: args.hang_on_stop,
        })
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Serve until a `stop` request arrives.
    ///
    /// Each socket2 listener is handed to its own `tiny_http` server, so the
    /// v6-only and dual-stack choices made at bind time carry over.
    pub fn serve(self) -> Result<(), FakeNodeError> {
        if self.hang_on_stop {
            ignore_sigterm();
        }

        let mut servers = Vec::with_capacity(self.listeners.len());
        for listener in &self.listeners {
            let addr = listener.local_addr().ok();
            let server = tiny_http::Server::from_listener(listener.try_clone()?, None)
                .map_err(|e| FakeNodeError::Serve {
                    addr,
                    reason: e.to_string(),
                })?;
            servers.push(server);
        }

        loop {
            let mut idle = true;
            for server in &servers {
                match server.try_recv() {
                    Ok(Some(request)) => {
                        idle = false;
                        if self.handle(request) && !self.hang_on_stop {
                            info!("stop requested; shutting down");
                            return Ok(());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "receiving request failed"),
                }
            }
            if idle {
                thread::sleep(ACCEPT_IDLE);
            }
        }
    }

    /// Answer one request. Returns true if it was an accepted `stop`.
    fn handle(&self, mut request: tiny_http::Request) -> bool {
        let peer = request.remote_addr().copied();

        // Drain the body first so closing never resets the peer.
        let mut body = Vec::new();
        if let Err(err) = request.as_reader().read_to_end(&mut body) {
            debug!(?peer, error = %err, "reading request body failed");
            return false;
        }

        let (response, stopping) = self.respond(peer, request.headers(), &body);
        if let Err(err) = request.respond(response) {
            debug!(?peer, error = %err, "writing response failed");
            return false;
        }
        stopping
    }

    fn respond(
        &self,
        peer: Option<SocketAddr>,
        headers: &[tiny_http::Header],
        body: &[u8],
    ) -> (tiny_http::Response<io::Cursor<Vec<u8>>>, bool) {
        if !peer.is_some_and(|p| self.origin_allowed(p.ip())) {
            info!(?peer, "rejecting origin");
            return (tiny_http::Response::from_string("").with_status_code(403), false);
        }

        let authorization = headers
            .iter()
            .find(|h| h.field.equiv("Authorization"))
            .map(|h| h.value.as_str());
        if authorization != Some(self.auth.as_str()) {
            info!(?peer, "incorrect password attempt");
            let response = tiny_http::Response::from_string("").with_status_code(401);
            let response = match header("WWW-Authenticate", "Basic realm=\"jsonrpc\"") {
                Some(h) => response.with_header(h),
                None => response,
            };
            return (response, false);
        }

        let (status, reply, stopping) = self.dispatch(body);
        let response = tiny_http::Response::from_string(reply.to_string()).with_status_code(status);
        let response = match header("Content-Type", "application/json") {
            Some(h) => response.with_header(h),
            None => response,
        };
        (response, stopping)
    }

    fn dispatch(&self, body: &[u8]) -> (u16, Value, bool) {
        #[derive(Deserialize)]
        struct Call {
            method: String,
            #[serde(default)]
            id: Value,
        }

        let call: Call = match serde_json::from_slice(body) {
            Ok(call) => call,
            Err(err) => {
                return (
                    500,
                    reply_error(Value::Null, -32700, &format!("Parse error: {err}")),
                    false,
                )
            }
        };

        if Instant::now() < self.warm_until {
            return (500, reply_error(call.id, RPC_IN_WARMUP, "Loading..."), false);
        }

        match call.method.as_str() {
            STATUS_METHOD => {
                let result = json!({
                    "version": 1,
                    "subversion": "/bc-fake-node/",
                    "localaddresses": self.local_addrs().iter().map(|a| a.to_string()).collect::<Vec<_>>(),
                });
                (200, reply_ok(call.id, result), false)
            }
            STOP_METHOD => (200, reply_ok(call.id, json!("bc-fake-node stopping")), true),
            other => (
                404,
                reply_error(call.id, -32601, &format!("Method not found: {other}")),
                false,
            ),
        }
    }

    fn origin_allowed(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        is_default_loopback(ip) || self.allow.iter().any(|a| a.contains(ip))
    }
}

/// `127.0.0.1` and `::1` are admitted without an allow-list entry.
fn is_default_loopback(ip: IpAddr) -> bool {
    ip == IpAddr::V4(Ipv4Addr::LOCALHOST) || ip == IpAddr::V6(Ipv6Addr::LOCALHOST)
}

fn endpoints_for(args: &FakeNodeArgs) -> Result<Vec<Endpoint>, FakeNodeError> {
    let port = args.rpc_port;
    if args.rpc_allow_ip.is_empty() {
        if !args.rpc_bind.is_empty() {
            warn!("option --rpc-bind was ignored because --rpc-allow-ip was not specified, refusing to allow everyone to connect");
        }
        return Ok(vec![
            Endpoint {
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
                required: false,
            },
            Endpoint {
                addr: SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port),
                required: false,
            },
        ]);
    }
    if args.rpc_bind.is_empty() {
        return Ok(vec![
            Endpoint {
                addr: SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
                required: false,
            },
            Endpoint {
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                required: false,
            },
        ]);
    }
    args.rpc_bind
        .iter()
        .map(|spec| {
            canonicalize(spec, port)
                .map(|addr| Endpoint {
                    addr: addr.socket_addr(),
                    required: true,
                })
                .map_err(FakeNodeError::BindSpec)
        })
        .collect()
}

fn listen(addr: SocketAddr, only_v6: bool) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(only_v6)?;
    }
    socket.set_reuse_address(true)?;
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(128)?;
    Ok(socket.into())
}

fn header(name: &str, value: &str) -> Option<tiny_http::Header> {
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn reply_ok(id: Value, result: Value) -> Value {
    json!({ "result": result, "error": null, "id": id })
}

fn reply_error(id: Value, code: i64, message: &str) -> Value {
    json!({ "result": null, "error": { "code": code, "message": message }, "id": id })
}

#[cfg(unix)]
fn ignore_sigterm() {
    // SAFETY: installing SIG_IGN has no preconditions.
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigterm() {}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(allow: &[&str], binds: &[&str]) -> FakeNodeArgs {
        FakeNodeArgs {
            datadir: PathBuf::from("/tmp"),
            rpc_port: 18443,
            rpc_user: "u".into(),
            rpc_password: "p".into(),
            disable_wallet: true,
            no_listen: true,
            rpc_allow_ip: allow.iter().map(|s| s.to_string()).collect(),
            rpc_bind: binds.iter().map(|s| s.to_string()).collect(),
            startup_delay_ms: 0,
            hang_on_stop: false,
            bind_extra_any: false,
        }
    }

    fn addrs(endpoints: Vec<Endpoint>) -> Vec<String> {
        endpoints.into_iter().map(|e| e.addr.to_string()).collect()
    }

    #[test]
    fn test_no_allowlist_binds_loopbacks_and_ignores_binds() {
        let endpoints = endpoints_for(&args(&[], &["127.0.0.2"])).unwrap();
        assert_eq!(addrs(endpoints), vec!["127.0.0.1:18443", "[::1]:18443"]);
    }

    #[test]
    fn test_allowlist_without_binds_widens_to_any() {
        let endpoints = endpoints_for(&args(&["127.0.0.1"], &[])).unwrap();
        assert_eq!(addrs(endpoints), vec!["[::]:18443", "0.0.0.0:18443"]);
    }

    #[test]
    fn test_explicit_binds_are_required() {
        let endpoints = endpoints_for(&args(&["127.0.0.1"], &["127.0.0.1:32171", "[::1]"])).unwrap();
        assert!(endpoints.iter().all(|e| e.required));
        assert_eq!(addrs(endpoints), vec!["127.0.0.1:32171", "[::1]:18443"]);
    }

    #[test]
    fn test_bad_bind_spec_rejected() {
        assert!(matches!(
            endpoints_for(&args(&["127.0.0.1"], &["localhost"])),
            Err(FakeNodeError::BindSpec(_))
        ));
    }

    #[test]
    fn test_origin_policy() {
        let node = FakeNode {
            listeners: Vec::new(),
            allow: vec![AllowSpec::parse("127.0.0.2").unwrap()],
            auth: String::new(),
            warm_until: Instant::now(),
            hang_on_stop: false,
        };
        assert!(node.origin_allowed(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(node.origin_allowed("::1".parse().unwrap()));
        assert!(node.origin_allowed("127.0.0.2".parse().unwrap()));
        assert!(node.origin_allowed("::ffff:127.0.0.2".parse().unwrap()));
        assert!(!node.origin_allowed("127.0.0.3".parse().unwrap()));

        let strict = FakeNode {
            allow: vec![AllowSpec::parse("1.1.1.1").unwrap()],
            ..node
        };
        assert!(!strict.origin_allowed("127.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_dispatch_methods() {
        let node = FakeNode {
            listeners: Vec::new(),
            allow: Vec::new(),
            auth: String::new(),
            warm_until: Instant::now(),
            hang_on_stop: false,
        };
        let (status, body, stopping) =
            node.dispatch(br#"{"method":"getnetworkinfo","params":[],"id":7}"#);
        assert_eq!(status, 200);
        assert_eq!(body["id"], 7);
        assert!(!stopping);

        let (_, _, stopping) = node.dispatch(br#"{"method":"stop","id":1}"#);
        assert!(stopping);

        let (status, body, _) = node.dispatch(br#"{"method":"nope","id":1}"#);
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], -32601);
    }

    #[test]
    fn test_warmup_error_before_ready() {
        let node = FakeNode {
            listeners: Vec::new(),
            allow: Vec::new(),
            auth: String::new(),
            warm_until: Instant::now() + Duration::from_secs(60),
            hang_on_stop: false,
        };
        let (_, body, _) = node.dispatch(br#"{"method":"getnetworkinfo","id":1}"#);
        assert_eq!(body["error"]["code"], RPC_IN_WARMUP);
    }

    #[test]
    fn test_bind_explicit_loopback() {
        let mut a = args(&["127.0.0.1"], &["127.0.0.1"]);
        a.rpc_port = 0;
        let node = FakeNode::bind(&a).unwrap();
        let local = node.local_addrs();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_rejected_origin_gets_empty_403() {
        let node = FakeNode {
            listeners: Vec::new(),
            allow: vec![AllowSpec::parse("127.0.0.2").unwrap()],
            auth: "Basic dTpw".into(),
            warm_until: Instant::now(),
            hang_on_stop: false,
        };
        let body = br#"{"method":"getnetworkinfo","id":1}"#;

        let (response, stopping) = node.respond(Some("127.0.0.3:40000".parse().unwrap()), &[], body);
        assert_eq!(response.status_code().0, 403);
        assert!(!stopping);

        let (response, _) = node.respond(None, &[], body);
        assert_eq!(response.status_code().0, 403);

        let (response, _) = node.respond(Some("127.0.0.2:40000".parse().unwrap()), &[], body);
        assert_eq!(response.status_code().0, 401);

        let auth = header("Authorization", "Basic dTpw").unwrap();
        let (response, _) = node.respond(Some("127.0.0.1:40000".parse().unwrap()), &[auth], body);
        assert_eq!(response.status_code().0, 200);
    }

    #[test]
    fn test_serves_status_deny_and_stop() {
        use crate::capabilities::probe_local_bind;
        use crate::rpc::{ProbeOutcome, RpcClient};

        let mut a = args(&["127.0.0.1"], &["127.0.0.1"]);
        a.rpc_port = 0;
        let node = FakeNode::bind(&a).unwrap();
        let addr = node.local_addrs()[0];
        let server = thread::spawn(move || node.serve());

        let client = RpcClient::new(addr, RpcCredentials::new("u", "p"))
            .with_timeout(Duration::from_secs(5));
        let info = client.call(STATUS_METHOD, json!([])).unwrap();
        assert_eq!(info["localaddresses"][0], addr.to_string());

        let wrong = RpcClient::new(addr, RpcCredentials::new("u", "nope"));
        assert_eq!(wrong.probe().label(), "unclassified");

        let other = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));
        if probe_local_bind(other) {
            let outcome = RpcClient::new(addr, RpcCredentials::new("u", "p"))
                .with_source(other)
                .probe();
            assert!(
                matches!(outcome, ProbeOutcome::ConfirmedDeny { .. }),
                "unexpected {outcome}"
            );
        }

        client.call(STOP_METHOD, json!([])).unwrap();
        server.join().unwrap().unwrap();
    }
}
