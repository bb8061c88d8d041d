//! Listening-socket inspection for a single process.
//!
//! # Data Sources
//! - `/proc/[pid]/fd/` - socket inode ownership (`socket:[12345]` links)
//! - `/proc/[pid]/net/tcp`, `/proc/[pid]/net/tcp6` - the socket tables as
//!   seen from the target's network namespace
//!
//! The kernel updates the tables while we read them, so a listing is only
//! returned once two consecutive snapshots agree.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use bc_common::ProcessId;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::addr::{decode_proc_net_endpoint, BindSet, CanonicalAddress};

/// Default number of reads while waiting for the table to settle.
pub const DEFAULT_SETTLE_ATTEMPTS: u32 = 5;

/// Default pause between settle reads.
pub const DEFAULT_SETTLE_BACKOFF: Duration = Duration::from_millis(20);

/// Errors from socket table inspection.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("socket table introspection unsupported: {0}")]
    Unsupported(String),

    #[error("process {0} not found")]
    ProcessGone(ProcessId),

    #[error("permission denied reading descriptors of process {0}")]
    PermissionDenied(ProcessId),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<InspectError> for bc_common::Error {
    fn from(err: InspectError) -> Self {
        match err {
            InspectError::Unsupported(reason) => bc_common::Error::InspectionUnsupported(reason),
            InspectError::ProcessGone(pid) => bc_common::Error::ProcessGone { pid: pid.0 },
            InspectError::PermissionDenied(pid) => bc_common::Error::PermissionDenied { pid: pid.0 },
            InspectError::Io { path, source } => bc_common::Error::Io(io::Error::new(
                source.kind(),
                format!("{}: {}", path.display(), source),
            )),
        }
    }
}

/// TCP connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    Unknown,
}

impl TcpState {
    /// Parse TCP state from /proc/net/tcp hex value.
    pub fn from_hex(hex: u8) -> Self {
        match hex {
            0x01 => TcpState::Established,
            0x02 => TcpState::SynSent,
            0x03 => TcpState::SynRecv,
            0x04 => TcpState::FinWait1,
            0x05 => TcpState::FinWait2,
            0x06 => TcpState::TimeWait,
            0x07 => TcpState::Close,
            0x08 => TcpState::CloseWait,
            0x09 => TcpState::LastAck,
            0x0A => TcpState::Listen,
            0x0B => TcpState::Closing,
            _ => TcpState::Unknown,
        }
    }

    pub fn is_listen(&self) -> bool {
        matches!(self, TcpState::Listen)
    }
}

/// One row of a `/proc/net/tcp{,6}` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpEntry {
    pub local: CanonicalAddress,
    pub state: TcpState,
    pub inode: u64,
}

/// Parse TCP table content. Rows that fail to decode are skipped.
pub fn parse_proc_net_tcp_content(content: &str, is_ipv6: bool) -> Vec<TcpEntry> {
    let mut entries = Vec::new();

    // Skip header line
    for line in content.lines().skip(1) {
        // Format: sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let Ok(local) = decode_proc_net_endpoint(parts[1], is_ipv6) else {
            trace!(line, "skipping undecodable socket table row");
            continue;
        };
        let state = u8::from_str_radix(parts[3], 16)
            .map(TcpState::from_hex)
            .unwrap_or(TcpState::Unknown);
        let Ok(inode) = parts[9].parse::<u64>() else {
            continue;
        };

        entries.push(TcpEntry {
            local,
            state,
            inode,
        });
    }

    entries
}

/// Extract the inode from a descriptor link target such as `socket:[12345]`.
pub fn socket_inode_from_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Reads a process's listening TCP endpoints from procfs.
#[derive(Debug, Clone)]
pub struct SocketInspector {
    proc_root: PathBuf,
    settle_attempts: u32,
    settle_backoff: Duration,
}

impl Default for SocketInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketInspector {
    pub fn new() -> Self {
        SocketInspector {
            proc_root: PathBuf::from("/proc"),
            settle_attempts: DEFAULT_SETTLE_ATTEMPTS,
            settle_backoff: DEFAULT_SETTLE_BACKOFF,
        }
    }

    /// Read from an alternate procfs root (synthetic trees in tests).
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn with_settle(mut self, attempts: u32, backoff: Duration) -> Self {
        self.settle_attempts = attempts.max(2);
        self.settle_backoff = backoff;
        self
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Whether this host exposes the tables this inspector reads.
    pub fn is_supported(&self) -> bool {
        cfg!(target_os = "linux") && self.proc_root.join("self").exists()
    }

    /// LISTEN-state local endpoints owned by `pid`.
    pub fn list_bound_addresses(&self, pid: ProcessId) -> Result<BindSet, InspectError> {
        if !cfg!(target_os = "linux") {
            return Err(InspectError::Unsupported(format!(
                "procfs socket tables are not available on {}",
                std::env::consts::OS
            )));
        }
        if !self.proc_root.is_dir() {
            return Err(InspectError::Unsupported(format!(
                "{} is not mounted",
                self.proc_root.display()
            )));
        }

        let mut previous = self.snapshot(pid)?;
        for attempt in 1..self.settle_attempts {
            thread::sleep(self.settle_backoff);
            let current = self.snapshot(pid)?;
            if current == previous {
                debug!(%pid, attempt, binds = %current, "socket table settled");
                return Ok(current);
            }
            trace!(%pid, attempt, "socket table changed between reads");
            previous = current;
        }
        debug!(%pid, binds = %previous, "socket table did not settle; using last read");
        Ok(previous)
    }

    /// Re-inspect until the observed set equals `expected` or attempts run out.
    ///
    /// Returns the last observation either way; the caller decides whether a
    /// difference is a failure.
    pub fn wait_for_binds(
        &self,
        pid: ProcessId,
        expected: &BindSet,
        attempts: u32,
        backoff: Duration,
    ) -> Result<BindSet, InspectError> {
        let attempts = attempts.max(1);
        let mut observed = self.list_bound_addresses(pid)?;
        for attempt in 1..attempts {
            if &observed == expected {
                break;
            }
            debug!(%pid, attempt, observed = %observed, expected = %expected, "bind set not yet as expected");
            thread::sleep(backoff);
            observed = self.list_bound_addresses(pid)?;
        }
        Ok(observed)
    }

    fn snapshot(&self, pid: ProcessId) -> Result<BindSet, InspectError> {
        let proc_dir = self.proc_root.join(pid.to_string());
        if !proc_dir.exists() {
            return Err(InspectError::ProcessGone(pid));
        }

        let inodes = self.socket_inodes(pid, &proc_dir)?;
        let mut binds = BindSet::new();
        if inodes.is_empty() {
            return Ok(binds);
        }

        for (table, is_ipv6) in [("tcp", false), ("tcp6", true)] {
            let path = proc_dir.join("net").join(table);
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                // tcp6 is absent when IPv6 is disabled
                Err(e) if e.kind() == io::ErrorKind::NotFound && is_ipv6 => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound && !proc_dir.exists() => {
                    return Err(InspectError::ProcessGone(pid))
                }
                Err(source) => return Err(InspectError::Io { path, source }),
            };
            binds.extend(
                parse_proc_net_tcp_content(&content, is_ipv6)
                    .into_iter()
                    .filter(|entry| entry.state.is_listen() && inodes.contains(&entry.inode))
                    .map(|entry| entry.local),
            );
        }

        Ok(binds)
    }

    fn socket_inodes(&self, pid: ProcessId, proc_dir: &Path) -> Result<HashSet<u64>, InspectError> {
        let fd_dir = proc_dir.join("fd");
        let entries = match fs::read_dir(&fd_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(InspectError::PermissionDenied(pid))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(InspectError::ProcessGone(pid))
            }
            Err(source) => {
                return Err(InspectError::Io {
                    path: fd_dir,
                    source,
                })
            }
        };

        let mut inodes = HashSet::new();
        // Descriptors can close between listing and readlink; skip those.
        for entry in entries.flatten() {
            if let Ok(target) = fs::read_link(entry.path()) {
                if let Some(inode) = socket_inode_from_link(&target.to_string_lossy()) {
                    inodes.insert(inode);
                }
            }
        }
        Ok(inodes)
    }
}
