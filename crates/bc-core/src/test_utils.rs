//! Test utilities for bc-core.
//!
//! This module provides test infrastructure including:
//! - Result assertions
//! - Synthetic procfs trees for socket inspection tests
//! - Executable shell-script targets
//! - Loopback listeners owned by the test process

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};

use bc_common::ProcessId;

// ============================================================================
// Macros
// ============================================================================

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($expr:expr, $msg:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(e) => e,
        }
    };
    ($expr:expr, $msg:expr) => {
        match $expr {
            Ok(val) => panic!("{}: got Ok({:?})", $msg, val),
            Err(e) => e,
        }
    };
}

// ============================================================================
// Synthetic procfs
// ============================================================================

/// Header line of `/proc/<pid>/net/tcp`.
pub const PROC_NET_TCP_HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

/// Builds a procfs-shaped directory tree for one process.
///
/// ```ignore
/// let proc = SyntheticProc::new(root, ProcessId(42))?
///     .socket(3, 1001)?
///     .tcp(&[tcp_row(0, "0100007F:1F90", "0A", 1001)])?;
/// let inspector = SocketInspector::new().with_proc_root(root);
/// ```
#[derive(Debug, Clone)]
pub struct SyntheticProc {
    root: PathBuf,
    pid: ProcessId,
}

impl SyntheticProc {
    /// Create `<root>/self` and `<root>/<pid>/{fd,net}`.
    pub fn new(root: &Path, pid: ProcessId) -> io::Result<Self> {
        fs::create_dir_all(root.join("self"))?;
        let proc = SyntheticProc {
            root: root.to_path_buf(),
            pid,
        };
        fs::create_dir_all(proc.dir().join("fd"))?;
        fs::create_dir_all(proc.dir().join("net"))?;
        Ok(proc)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(self.pid.to_string())
    }

    /// Add descriptor `fd` pointing at `socket:[inode]`.
    #[cfg(unix)]
    pub fn socket(self, fd: u32, inode: u64) -> io::Result<Self> {
        let link = self.dir().join("fd").join(fd.to_string());
        std::os::unix::fs::symlink(format!("socket:[{inode}]"), link)?;
        Ok(self)
    }

    /// Add descriptor `fd` pointing at a regular path.
    #[cfg(unix)]
    pub fn file(self, fd: u32, target: &str) -> io::Result<Self> {
        let link = self.dir().join("fd").join(fd.to_string());
        std::os::unix::fs::symlink(target, link)?;
        Ok(self)
    }

    /// Write `net/tcp` with a header and the given rows.
    pub fn tcp(self, rows: &[String]) -> io::Result<Self> {
        self.write_table("tcp", rows)?;
        Ok(self)
    }

    /// Write `net/tcp6` with a header and the given rows.
    pub fn tcp6(self, rows: &[String]) -> io::Result<Self> {
        self.write_table("tcp6", rows)?;
        Ok(self)
    }

    fn write_table(&self, name: &str, rows: &[String]) -> io::Result<()> {
        let mut content = String::from(PROC_NET_TCP_HEADER);
        content.push('\n');
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(self.dir().join("net").join(name), content)
    }
}

/// One `/proc/net/tcp{,6}` row.
pub fn tcp_row(slot: u32, local: &str, state: &str, inode: u64) -> String {
    let remote = if local.len() > 13 {
        "00000000000000000000000000000000:0000"
    } else {
        "00000000:0000"
    };
    format!(
        "{slot:>4}: {local} {remote} {state} 00000000:00000000 00:00000000 00000000  1000        0 {inode} 1 0000000000000000 100 0 0 10 0"
    )
}

// ============================================================================
// Processes and sockets
// ============================================================================

/// Write an executable `#!/bin/sh` script and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Listen on `ip:0` and return the listener with its address.
pub fn ephemeral_listener(ip: &str) -> io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind((ip, 0))?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// A port that was free a moment ago.
pub fn free_port() -> io::Result<u16> {
    let (_listener, addr) = ephemeral_listener("127.0.0.1")?;
    Ok(addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_row_field_positions() {
        let row = tcp_row(0, "0100007F:1F90", "0A", 4242);
        let parts: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(parts[1], "0100007F:1F90");
        assert_eq!(parts[3], "0A");
        assert_eq!(parts[9], "4242");
    }

    #[test]
    fn test_free_port_nonzero() {
        assert_ne!(free_port().unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_synthetic_proc_layout() {
        let dir = tempfile::tempdir().unwrap();
        let proc = SyntheticProc::new(dir.path(), ProcessId(7))
            .unwrap()
            .socket(3, 99)
            .unwrap()
            .tcp(&[])
            .unwrap();
        assert!(dir.path().join("self").is_dir());
        let link = fs::read_link(proc.dir().join("fd/3")).unwrap();
        assert_eq!(link.to_str(), Some("socket:[99]"));
        assert!(fs::read_to_string(proc.dir().join("net/tcp"))
            .unwrap()
            .starts_with("  sl"));
    }
}
