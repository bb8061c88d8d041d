//! Target process lifecycle.
//!
//! The [`ProcessController`] owns at most one live target at a time. Each
//! start gets a fresh data directory, blocks until the target answers a
//! status query, and every exit path (stop, failed start, drop) leaves no
//! child behind.

mod controller;
pub mod ports;
mod preset;
pub mod signal;

pub use controller::{ControllerSettings, ProcessController, StopOutcome};
pub use ports::{PortAssignment, PortKind, PortSeed};
pub use preset::{LaunchContext, LaunchPlan, Preset};

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bc_common::ProcessId;
use serde::Serialize;
use thiserror::Error;

/// Errors from starting or stopping a target.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("a target process is already running (pid {0})")]
    AlreadyRunning(ProcessId),

    #[error("no target binary configured (set [target] binary or pass --binary)")]
    NoBinary,

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare data directory: {0}")]
    DataDir(#[source] io::Error),

    #[error("target did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("target exited during startup ({status}): {stderr_tail}")]
    Exited { status: String, stderr_tail: String },

    #[error("target pid {pid} did not exit within {timeout:?}")]
    ShutdownTimeout { pid: ProcessId, timeout: Duration },

    #[error("waiting on pid {pid} failed: {source}")]
    Wait {
        pid: ProcessId,
        #[source]
        source: io::Error,
    },
}

impl From<NodeError> for bc_common::Error {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::AlreadyRunning(pid) => bc_common::Error::ProcessAlreadyRunning { pid: pid.0 },
            NodeError::NoBinary => bc_common::Error::Config(err.to_string()),
            NodeError::Spawn { binary, source } => bc_common::Error::Spawn {
                binary: binary.display().to_string(),
                reason: source.to_string(),
            },
            NodeError::DataDir(source) => bc_common::Error::Io(source),
            NodeError::StartupTimeout(timeout) => bc_common::Error::StartupTimeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            NodeError::Exited {
                status,
                stderr_tail,
            } => bc_common::Error::ProcessExited {
                status,
                stderr_tail,
            },
            NodeError::ShutdownTimeout { pid, timeout } => bc_common::Error::ShutdownTimeout {
                pid: pid.0,
                timeout_ms: timeout.as_millis() as u64,
            },
            NodeError::Wait { source, .. } => bc_common::Error::Io(source),
        }
    }
}

/// Options a scenario passes to [`ProcessController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOptions {
    pub disable_wallet: bool,
    /// Turn off the target's automatic peer listener.
    pub disable_auto_listen: bool,
    /// Allow-list entries, passed through verbatim.
    pub rpc_allow_ip: Vec<String>,
    /// Bind specs, passed through verbatim.
    pub rpc_bind: Vec<String>,
    /// Where readiness and shutdown requests are sent.
    pub connect_to: SocketAddr,
}

/// Lifecycle state of a target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Starting,
    Running,
    Stopped,
}

/// The live target owned by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: ProcessId,
    state: LifecycleState,
    datadir: PathBuf,
    connect_to: SocketAddr,
}

impl ProcessHandle {
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn datadir(&self) -> &std::path::Path {
        &self.datadir
    }

    pub fn connect_to(&self) -> SocketAddr {
        self.connect_to
    }
}
