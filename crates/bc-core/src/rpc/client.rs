//! Blocking JSON-RPC client with optional source-address binding.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

use super::http::{self, HttpResponse};
use super::{ProbeOutcome, RpcError, STATUS_METHOD};

/// Default bound on connect, read and write.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// User/password pair for HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct RpcCredentials {
    pub user: String,
    pub password: String,
}

impl RpcCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        RpcCredentials {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.user, self.password));
        format!("Basic {token}")
    }
}

impl fmt::Debug for RpcCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcReplyError>,
}

#[derive(Debug, Deserialize)]
struct RpcReplyError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// One JSON-RPC endpoint, optionally reached from a fixed local address.
#[derive(Debug)]
pub struct RpcClient {
    endpoint: SocketAddr,
    source: Option<IpAddr>,
    credentials: RpcCredentials,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: SocketAddr, credentials: RpcCredentials) -> Self {
        RpcClient {
            endpoint,
            source: None,
            credentials,
            timeout: DEFAULT_RPC_TIMEOUT,
            next_id: AtomicU64::new(1),
        }
    }

    /// Originate connections from `source` (ephemeral port).
    pub fn with_source(mut self, source: IpAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn source(&self) -> Option<IpAddr> {
        self.source
    }

    /// Call `method` and return its `result`.
    pub fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let payload = serde_json::to_vec(&body).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        trace!(endpoint = %self.endpoint, source = ?self.source, method, id, "rpc request");
        let response = self.exchange(&payload)?;
        interpret(response)
    }

    /// Issue the status query and classify the result.
    pub fn probe(&self) -> ProbeOutcome {
        ProbeOutcome::classify(&self.call(STATUS_METHOD, json!([])))
    }

    fn exchange(&self, payload: &[u8]) -> Result<HttpResponse, RpcError> {
        let mut stream = self.connect()?;
        let host = self.endpoint.to_string();
        let auth = self.credentials.header_value();

        http::write_post(&mut stream, &host, "/", Some(&auth), payload).map_err(|e| {
            if is_timeout(&e) {
                RpcError::Timeout(self.timeout)
            } else {
                RpcError::Http(e.into())
            }
        })?;

        http::read_response(&stream).map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout(self.timeout)
            } else {
                RpcError::Http(e)
            }
        })
    }

    fn connect(&self) -> Result<TcpStream, RpcError> {
        let connect_err = |source: io::Error| RpcError::Connect {
            endpoint: self.endpoint,
            source,
        };

        let socket = Socket::new(
            Domain::for_address(self.endpoint),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(connect_err)?;

        if let Some(source) = self.source {
            socket
                .bind(&SockAddr::from(SocketAddr::new(source, 0)))
                .map_err(|e| RpcError::SourceBind { source_ip: source, error: e })?;
        }

        socket
            .connect_timeout(&SockAddr::from(self.endpoint), self.timeout)
            .map_err(|e| {
                if is_timeout(&e) {
                    RpcError::Timeout(self.timeout)
                } else {
                    connect_err(e)
                }
            })?;

        let stream: TcpStream = socket.into();
        stream.set_read_timeout(Some(self.timeout)).map_err(connect_err)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(connect_err)?;
        Ok(stream)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Map an HTTP response to a JSON-RPC result.
fn interpret(response: HttpResponse) -> Result<Value, RpcError> {
    match serde_json::from_slice::<RpcReply>(&response.body) {
        Ok(RpcReply {
            error: Some(err), ..
        }) => Err(RpcError::Rpc {
            code: err.code,
            message: err.message,
        }),
        Ok(reply) if response.status == 200 => Ok(reply.result),
        _ => Err(RpcError::Status {
            status: response.status,
            reason: response.reason.clone(),
            body: response.body_text(),
            json_body: serde_json::from_slice::<Value>(&response.body).is_ok(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, reason: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_header_value() {
        let creds = RpcCredentials::new("user", "pass");
        assert_eq!(creds.header_value(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = RpcCredentials::new("user", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_interpret_success() {
        let value = interpret(response(200, "OK", r#"{"result":{"version":1},"error":null,"id":1}"#)).unwrap();
        assert_eq!(value["version"], 1);
    }

    #[test]
    fn test_interpret_rpc_error() {
        let err = interpret(response(
            500,
            "Internal Server Error",
            r#"{"result":null,"error":{"code":-28,"message":"Loading block index..."},"id":1}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -28, .. }));
        assert!(err.is_warming_up());
    }

    #[test]
    fn test_interpret_non_json_forbidden() {
        let err = interpret(response(403, "Forbidden", "")).unwrap_err();
        match err {
            RpcError::Status {
                status, json_body, ..
            } => {
                assert_eq!(status, 403);
                assert!(!json_body);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_connect_refused() {
        // Grab a free port, then close it so nothing listens there.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = RpcClient::new(
            SocketAddr::from(([127, 0, 0, 1], port)),
            RpcCredentials::new("u", "p"),
        )
        .with_timeout(Duration::from_millis(500));
        let err = client.call("getnetworkinfo", json!([])).unwrap_err();
        assert!(err.is_not_listening(), "{err:?}");
    }
}
