//! Signal delivery for target shutdown.
//!
//! Staged escalation: SIGTERM for a graceful exit, SIGKILL when the window
//! runs out.

use std::io;

use bc_common::ProcessId;

/// Signals the controller sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Term => write!(f, "SIGTERM"),
            Signal::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// Send a signal to a process.
#[cfg(unix)]
pub fn send_signal(pid: ProcessId, signal: Signal) -> io::Result<()> {
    let raw = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let result = unsafe { libc::kill(pid.as_raw(), raw) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn send_signal(_pid: ProcessId, signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{signal} is not available on this platform"),
    ))
}

/// Check if a process exists.
#[cfg(unix)]
pub fn process_exists(pid: ProcessId) -> bool {
    let result = unsafe { libc::kill(pid.as_raw(), 0) };
    if result == 0 {
        return true;
    }
    // EPERM means process exists but we can't signal it
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_exists(_pid: ProcessId) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_self_exists() {
        assert!(process_exists(ProcessId(std::process::id())));
    }

    #[test]
    fn test_term_stops_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = ProcessId(child.id());
        send_signal(pid, Signal::Term).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!process_exists(pid));
    }

    #[test]
    fn test_signal_to_missing_process_fails() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = ProcessId(child.id());
        child.wait().unwrap();
        let err = send_signal(pid, Signal::Kill).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
    }
}
