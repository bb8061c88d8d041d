//! Client-side HTTP/1.1 framing for JSON-RPC exchanges.
//!
//! Only what a one-request-per-connection JSON-RPC call needs: a POST with
//! `Content-Length` and `Connection: close`, and a response body delimited
//! by `Content-Length` or EOF. The request goes over a caller-supplied
//! stream so the caller controls the source address of the connection.

use std::io::{self, BufRead, BufReader, Read, Write};

use thiserror::Error;

/// Upper bound on header bytes read from a peer.
const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Upper bound on body bytes read from a peer.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Errors while reading or writing an HTTP message.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed HTTP message: {0}")]
    Malformed(String),

    #[error("HTTP message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("connection closed before a complete message was received")]
    Truncated,
}

impl HttpError {
    /// True for read timeouts (`WouldBlock` / `TimedOut` from a socket with a timeout set).
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut))
    }
}

/// A parsed HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `status reason`, e.g. `403 Forbidden`.
    pub fn status_line(&self) -> String {
        format!("{} {}", self.status, self.reason)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Write a JSON POST request.
pub fn write_post<W: Write>(
    out: &mut W,
    host: &str,
    path: &str,
    authorization: Option<&str>,
    body: &[u8],
) -> io::Result<()> {
    let mut head = format!(
        "POST {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
        body.len()
    );
    if let Some(auth) = authorization {
        head.push_str(&format!("Authorization: {auth}\r\n"));
    }
    head.push_str("\r\n");
    out.write_all(head.as_bytes())?;
    out.write_all(body)?;
    out.flush()
}

/// Read a response. The body ends at `Content-Length` or, without one, at EOF.
pub fn read_response<R: Read>(input: R) -> Result<HttpResponse, HttpError> {
    let mut reader = BufReader::new(input);
    // One past the cap so an oversized head is reported rather than truncated.
    let (start, headers) = read_head(&mut (&mut reader).take(MAX_HEADER_BYTES as u64 + 1))?;

    let mut parts = start.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("bad status line: {start}")));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| HttpError::Malformed(format!("bad status line: {start}")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let body = read_body(&mut reader, content_length(&headers)?)?;
    Ok(HttpResponse {
        status,
        reason,
        headers,
        body,
    })
}

fn read_head<R: BufRead>(reader: &mut R) -> Result<(String, Vec<(String, String)>), HttpError> {
    let mut consumed = 0usize;
    let mut start = String::new();
    let mut headers = Vec::new();

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(HttpError::Truncated);
        }
        consumed += n;
        if consumed > MAX_HEADER_BYTES {
            return Err(HttpError::TooLarge(MAX_HEADER_BYTES));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if start.is_empty() {
            if line.is_empty() {
                // Tolerate stray CRLF before the start line.
                continue;
            }
            start = line.to_string();
            continue;
        }
        if line.is_empty() {
            return Ok((start, headers));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::Malformed(format!("bad header: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
}

fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, HttpError> {
    match find_header(headers, "Content-Length") {
        None => Ok(None),
        Some(v) => v
            .parse::<usize>()
            .map(Some)
            .map_err(|_| HttpError::Malformed(format!("bad Content-Length: {v}"))),
    }
}

fn read_body<R: Read>(reader: &mut R, length: Option<usize>) -> Result<Vec<u8>, HttpError> {
    match length {
        Some(len) if len > MAX_BODY_BYTES => Err(HttpError::TooLarge(MAX_BODY_BYTES)),
        Some(len) => {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => HttpError::Truncated,
                _ => HttpError::Io(e),
            })?;
            Ok(body)
        }
        None => {
            let mut body = Vec::new();
            reader
                .take(MAX_BODY_BYTES as u64 + 1)
                .read_to_end(&mut body)?;
            if body.len() > MAX_BODY_BYTES {
                return Err(HttpError::TooLarge(MAX_BODY_BYTES));
            }
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_carries_auth_and_length() {
        let mut wire = Vec::new();
        write_post(&mut wire, "127.0.0.1:18443", "/", Some("Basic dTpw"), br#"{"id":1}"#).unwrap();

        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("POST / HTTP/1.1\r\nHost: 127.0.0.1:18443\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Content-Length: 8\r\n"));
        assert!(text.contains("Authorization: Basic dTpw\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"id\":1}"));
    }

    #[test]
    fn test_response_with_content_length() {
        let wire = b"HTTP/1.1 403 Forbidden\r\nContent-Type: text/plain; charset=UTF-8\r\nContent-Length: 9\r\n\r\nForbidden";

        let resp = read_response(&wire[..]).unwrap();
        assert_eq!(resp.status, 403);
        assert_eq!(resp.reason, "Forbidden");
        assert_eq!(resp.status_line(), "403 Forbidden");
        assert_eq!(resp.header("content-type"), Some("text/plain; charset=UTF-8"));
        assert_eq!(resp.body_text(), "Forbidden");
    }

    #[test]
    fn test_response_body_until_eof() {
        let wire = b"HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"result\":1}";
        let resp = read_response(&wire[..]).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"{\"result\":1}");
    }

    #[test]
    fn test_truncated_and_malformed() {
        assert!(matches!(
            read_response(&b""[..]),
            Err(HttpError::Truncated)
        ));
        assert!(matches!(
            read_response(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"[..]),
            Err(HttpError::Truncated)
        ));
        assert!(matches!(
            read_response(&b"SSH-2.0-OpenSSH\r\n\r\n"[..]),
            Err(HttpError::Malformed(_))
        ));
        assert!(matches!(
            read_response(&b"HTTP/1.1 200 OK\r\nContent-Length: x\r\n\r\n"[..]),
            Err(HttpError::Malformed(_))
        ));
    }

    #[test]
    fn test_status_without_reason() {
        let resp = read_response(&b"HTTP/1.1 204\r\nContent-Length: 0\r\n\r\n"[..]).unwrap();
        assert_eq!(resp.status, 204);
        assert_eq!(resp.reason, "");
    }

    #[test]
    fn test_endless_header_line_is_capped() {
        // A peer that never ends its header line must not be buffered without bound.
        let endless = (&b"HTTP/1.1 200 OK\r\nX-Pad: "[..]).chain(io::repeat(b'a'));
        assert!(matches!(
            read_response(endless),
            Err(HttpError::TooLarge(MAX_HEADER_BYTES))
        ));

        let endless_status = io::repeat(b'H');
        assert!(matches!(
            read_response(endless_status),
            Err(HttpError::TooLarge(MAX_HEADER_BYTES))
        ));
    }
}
