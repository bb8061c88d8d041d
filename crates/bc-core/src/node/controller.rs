//! Single-slot process controller.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use bc_common::ProcessId;
use serde::Serialize;
use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, info, trace, warn};

use super::ports::PortAssignment;
use super::preset::{LaunchContext, Preset};
use super::signal::{self, Signal};
use super::{LifecycleState, NodeError, NodeOptions, ProcessHandle};
use crate::config::HarnessConfig;
use crate::rpc::{RpcClient, RpcCredentials, STATUS_METHOD, STOP_METHOD};

/// Target stdout, inside the data directory.
pub const STDOUT_LOG: &str = "stdout.log";

/// Target stderr, inside the data directory.
pub const STDERR_LOG: &str = "stderr.log";

/// How long SIGKILL gets before we give up on the child.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Bytes of stderr quoted when a target dies during startup.
const STDERR_TAIL_BYTES: u64 = 2048;

/// Everything the controller needs, resolved from [`HarnessConfig`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub binary: PathBuf,
    pub preset: Preset,
    pub extra_args: Vec<String>,
    pub credentials: RpcCredentials,
    pub ports: PortAssignment,
    pub rpc_timeout: Duration,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub poll_interval: Duration,
    pub work_dir: Option<PathBuf>,
    pub keep_datadirs: bool,
}

impl ControllerSettings {
    pub fn from_config(config: &HarnessConfig, ports: PortAssignment) -> Result<Self, NodeError> {
        let binary = config.target.binary.clone().ok_or(NodeError::NoBinary)?;
        Ok(ControllerSettings {
            binary,
            preset: config.target.preset,
            extra_args: config.target.extra_args.clone(),
            credentials: RpcCredentials::new(&config.rpc.user, &config.rpc.password),
            ports,
            rpc_timeout: config.rpc_timeout(),
            startup_timeout: config.startup_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
            poll_interval: config.poll_interval(),
            work_dir: config.work_dir.clone(),
            keep_datadirs: config.keep_datadirs,
        })
    }
}

/// How [`ProcessController::stop`] ended the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing was running.
    NotRunning,
    /// The target exited within the shutdown window.
    Graceful,
    /// The window elapsed and the target was killed.
    Forced,
}

struct ActiveTarget {
    handle: ProcessHandle,
    child: Child,
    // Dropping removes the directory unless it was created with keep.
    _datadir: TempDir,
}

/// Starts and stops one target at a time.
pub struct ProcessController {
    settings: ControllerSettings,
    active: Option<ActiveTarget>,
}

impl ProcessController {
    pub fn new(settings: ControllerSettings) -> Self {
        ProcessController {
            settings,
            active: None,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// The live target, if any.
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.active.as_ref().map(|t| &t.handle)
    }

    /// Launch the target and block until it answers a status query.
    ///
    /// On any failure the child is killed and the slot stays empty.
    pub fn start(&mut self, options: &NodeOptions) -> Result<&ProcessHandle, NodeError> {
        if let Some(active) = &self.active {
            return Err(NodeError::AlreadyRunning(active.handle.pid));
        }

        let datadir = self.create_datadir()?;
        let ctx = LaunchContext {
            datadir: datadir.path(),
            rpc_port: self.settings.ports.rpc,
            p2p_port: self.settings.ports.p2p,
            credentials: &self.settings.credentials,
        };
        let plan = self.settings.preset.render(&ctx, options);
        for (relative, contents) in &plan.files {
            fs::write(datadir.path().join(relative), contents).map_err(NodeError::DataDir)?;
        }
        let stdout = File::create(datadir.path().join(STDOUT_LOG)).map_err(NodeError::DataDir)?;
        let stderr = File::create(datadir.path().join(STDERR_LOG)).map_err(NodeError::DataDir)?;

        debug!(
            binary = %self.settings.binary.display(),
            args = ?plan.args,
            extra_args = ?self.settings.extra_args,
            "spawning target"
        );
        let child = Command::new(&self.settings.binary)
            .args(&plan.args)
            .args(&self.settings.extra_args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| NodeError::Spawn {
                binary: self.settings.binary.clone(),
                source,
            })?;

        let mut target = ActiveTarget {
            handle: ProcessHandle {
                pid: ProcessId(child.id()),
                state: LifecycleState::Starting,
                datadir: datadir.path().to_path_buf(),
                connect_to: options.connect_to,
            },
            child,
            _datadir: datadir,
        };

        if let Err(err) = wait_until_ready(&mut target, &self.settings) {
            warn!(pid = %target.handle.pid, error = %err, "target failed to start; killing");
            kill_target(&mut target);
            return Err(err);
        }

        target.handle.state = LifecycleState::Running;
        info!(pid = %target.handle.pid, connect_to = %target.handle.connect_to, "target ready");
        Ok(&self.active.insert(target).handle)
    }

    /// Ask the target to exit, escalating to SIGTERM and then SIGKILL.
    ///
    /// A forced kill is reported as [`StopOutcome::Forced`]; only a target
    /// that survives SIGKILL is an error.
    pub fn stop(&mut self) -> Result<StopOutcome, NodeError> {
        let Some(mut target) = self.active.take() else {
            return Ok(StopOutcome::NotRunning);
        };
        let pid = target.handle.pid;

        let client = RpcClient::new(target.handle.connect_to, self.settings.credentials.clone())
            .with_timeout(self.settings.rpc_timeout);
        if let Err(err) = client.call(STOP_METHOD, json!([])) {
            debug!(%pid, error = %err, "stop request failed; sending SIGTERM");
            if let Err(err) = signal::send_signal(pid, Signal::Term) {
                warn!(%pid, error = %err, "SIGTERM failed");
            }
        }

        let exited = match wait_for_exit(
            &mut target.child,
            pid,
            self.settings.shutdown_timeout,
            self.settings.poll_interval,
        ) {
            Ok(exited) => exited,
            Err(err) => {
                kill_target(&mut target);
                return Err(err);
            }
        };
        let outcome = if exited {
            StopOutcome::Graceful
        } else {
            warn!(
                %pid,
                timeout_ms = self.settings.shutdown_timeout.as_millis() as u64,
                "target ignored shutdown; sending SIGKILL"
            );
            if !kill_target(&mut target) {
                return Err(NodeError::ShutdownTimeout {
                    pid,
                    timeout: self.settings.shutdown_timeout,
                });
            }
            StopOutcome::Forced
        };

        target.handle.state = LifecycleState::Stopped;
        if self.settings.keep_datadirs {
            info!(%pid, datadir = %target.handle.datadir.display(), "keeping data directory");
        }
        debug!(%pid, ?outcome, "target stopped");
        Ok(outcome)
    }

    /// Kill the live target without asking. No-op when nothing runs.
    pub fn force_kill(&mut self) {
        if let Some(mut target) = self.active.take() {
            warn!(pid = %target.handle.pid, "force-killing target");
            kill_target(&mut target);
        }
    }

    fn create_datadir(&self) -> Result<TempDir, NodeError> {
        let parent = self
            .settings
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        fs::create_dir_all(&parent).map_err(NodeError::DataDir)?;
        tempfile::Builder::new()
            .prefix("bindcheck-")
            .keep(self.settings.keep_datadirs)
            .tempdir_in(&parent)
            .map_err(NodeError::DataDir)
    }
}

impl Drop for ProcessController {
    fn drop(&mut self) {
        self.force_kill();
    }
}

fn wait_until_ready(target: &mut ActiveTarget, settings: &ControllerSettings) -> Result<(), NodeError> {
    let pid = target.handle.pid;
    let client = RpcClient::new(target.handle.connect_to, settings.credentials.clone())
        .with_timeout(settings.rpc_timeout.min(settings.startup_timeout));
    let deadline = Instant::now() + settings.startup_timeout;
    let mut polls = 0u32;

    loop {
        if let Some(status) = target
            .child
            .try_wait()
            .map_err(|source| NodeError::Wait { pid, source })?
        {
            return Err(NodeError::Exited {
                status: status.to_string(),
                stderr_tail: read_tail(&target.handle.datadir.join(STDERR_LOG), STDERR_TAIL_BYTES),
            });
        }

        match client.call(STATUS_METHOD, json!([])) {
            Ok(_) => {
                debug!(%pid, polls, "status query answered");
                return Ok(());
            }
            Err(err) => trace!(%pid, polls, error = %err, "target not ready yet"),
        }

        polls += 1;
        if Instant::now() >= deadline {
            return Err(NodeError::StartupTimeout(settings.startup_timeout));
        }
        thread::sleep(settings.poll_interval);
    }
}

/// Poll for exit until `timeout`. Returns whether the child exited.
fn wait_for_exit(
    child: &mut Child,
    pid: ProcessId,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<bool, NodeError> {
    let start = Instant::now();
    loop {
        if child
            .try_wait()
            .map_err(|source| NodeError::Wait { pid, source })?
            .is_some()
        {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Ok(false);
        }
        thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())).max(Duration::from_millis(1)));
    }
}

/// SIGKILL and reap. Returns whether the child is gone.
fn kill_target(target: &mut ActiveTarget) -> bool {
    let pid = target.handle.pid;
    if let Err(err) = signal::send_signal(pid, Signal::Kill) {
        debug!(%pid, error = %err, "SIGKILL failed; falling back to Child::kill");
        let _ = target.child.kill();
    }
    match wait_for_exit(&mut target.child, pid, KILL_GRACE, Duration::from_millis(20)) {
        Ok(true) => {
            target.handle.state = LifecycleState::Stopped;
            true
        }
        Ok(false) => {
            warn!(%pid, "target survived SIGKILL");
            false
        }
        Err(err) => {
            warn!(%pid, error = %err, "failed to reap target");
            false
        }
    }
}

/// Last `max_bytes` of a file, lossily decoded and trimmed.
fn read_tail(path: &Path, max_bytes: u64) -> String {
    let Ok(mut file) = File::open(path) else {
        return String::new();
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if len > max_bytes && file.seek(SeekFrom::Start(len - max_bytes)).is_err() {
        return String::new();
    }
    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}
