//! Error types for bindcheck.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - A scenario-level failure classification (`FailureKind`)
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Startup Timeout
//!   Reason: target did not become ready within 60000ms
//!   Fix: Check the target's debug log in the kept data directory (--keep-datadirs)
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 40,
//!   "category": "verification",
//!   "message": "bind mismatch: expected [...], actual [...]",
//!   "failure_kind": "bind_mismatch",
//!   "context": { "expected": ["127.0.0.1:18443"], "actual": [] }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for bindcheck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Address and allow-list literal errors.
    Address,
    /// Socket table inspection errors.
    Inspection,
    /// Target process lifecycle errors.
    Lifecycle,
    /// Bind or access-control assertion failures.
    Verification,
    /// Configuration file errors.
    Config,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Address => write!(f, "address"),
            ErrorCategory::Inspection => write!(f, "inspection"),
            ErrorCategory::Lifecycle => write!(f, "lifecycle"),
            ErrorCategory::Verification => write!(f, "verification"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// How a failed scenario is classified in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Startup or shutdown exceeded its window; the target was force-killed.
    Timeout,
    /// Actual bind set differs from the expected one.
    BindMismatch,
    /// Probe classified, but not as the scenario expected.
    AllowlistMismatch,
    /// Probe result could not be classified as permit or confirmed deny.
    Protocol,
    /// A scenario literal could not be parsed.
    MalformedAddress,
    /// Target failed to spawn, exited early, or the slot was busy.
    Lifecycle,
    /// Local I/O, permission, or configuration problem.
    Io,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::BindMismatch => write!(f, "bind_mismatch"),
            FailureKind::AllowlistMismatch => write!(f, "allowlist_mismatch"),
            FailureKind::Protocol => write!(f, "protocol"),
            FailureKind::MalformedAddress => write!(f, "malformed_address"),
            FailureKind::Lifecycle => write!(f, "lifecycle"),
            FailureKind::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for bindcheck.
#[derive(Error, Debug)]
pub enum Error {
    // Address errors (10-19)
    #[error("malformed address '{input}': {reason}")]
    MalformedAddress { input: String, reason: String },

    // Inspection errors (20-29)
    #[error("socket inspection unsupported: {0}")]
    InspectionUnsupported(String),

    #[error("process {pid} not found")]
    ProcessGone { pid: u32 },

    #[error("permission denied inspecting process {pid}")]
    PermissionDenied { pid: u32 },

    // Lifecycle errors (30-39)
    #[error("target did not become ready within {timeout_ms}ms")]
    StartupTimeout { timeout_ms: u64 },

    #[error("target pid {pid} did not exit within {timeout_ms}ms")]
    ShutdownTimeout { pid: u32, timeout_ms: u64 },

    #[error("a target process is already running (pid {pid})")]
    ProcessAlreadyRunning { pid: u32 },

    #[error("target exited during startup ({status}): {stderr_tail}")]
    ProcessExited { status: String, stderr_tail: String },

    #[error("failed to spawn target {binary}: {reason}")]
    Spawn { binary: String, reason: String },

    // Verification errors (40-49)
    #[error("bind mismatch: expected {expected:?}, actual {actual:?}")]
    BindMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("allow-list mismatch: expected {expected}, observed {observed}")]
    AllowlistMismatch { expected: String, observed: String },

    #[error("unclassified response from status query: {0}")]
    ProtocolError(String),

    // Configuration errors (50-59)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Address errors
    /// - 20-29: Inspection errors
    /// - 30-39: Lifecycle errors
    /// - 40-49: Verification errors
    /// - 50-59: Configuration errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::MalformedAddress { .. } => 10,
            Error::InspectionUnsupported(_) => 20,
            Error::ProcessGone { .. } => 21,
            Error::PermissionDenied { .. } => 22,
            Error::StartupTimeout { .. } => 30,
            Error::ShutdownTimeout { .. } => 31,
            Error::ProcessAlreadyRunning { .. } => 32,
            Error::ProcessExited { .. } => 33,
            Error::Spawn { .. } => 34,
            Error::BindMismatch { .. } => 40,
            Error::AllowlistMismatch { .. } => 41,
            Error::ProtocolError(_) => 42,
            Error::Config(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MalformedAddress { .. } => ErrorCategory::Address,

            Error::InspectionUnsupported(_)
            | Error::ProcessGone { .. }
            | Error::PermissionDenied { .. } => ErrorCategory::Inspection,

            Error::StartupTimeout { .. }
            | Error::ShutdownTimeout { .. }
            | Error::ProcessAlreadyRunning { .. }
            | Error::ProcessExited { .. }
            | Error::Spawn { .. } => ErrorCategory::Lifecycle,

            Error::BindMismatch { .. }
            | Error::AllowlistMismatch { .. }
            | Error::ProtocolError(_) => ErrorCategory::Verification,

            Error::Config(_) => ErrorCategory::Config,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Host incapability: the scenario is skipped, never failed.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::InspectionUnsupported(_))
    }

    /// Classification used when this error fails a scenario.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::StartupTimeout { .. } | Error::ShutdownTimeout { .. } => FailureKind::Timeout,
            Error::BindMismatch { .. } => FailureKind::BindMismatch,
            Error::AllowlistMismatch { .. } => FailureKind::AllowlistMismatch,
            Error::ProtocolError(_) => FailureKind::Protocol,
            Error::MalformedAddress { .. } => FailureKind::MalformedAddress,
            Error::ProcessAlreadyRunning { .. }
            | Error::ProcessExited { .. }
            | Error::Spawn { .. }
            | Error::ProcessGone { .. } => FailureKind::Lifecycle,
            Error::InspectionUnsupported(_)
            | Error::PermissionDenied { .. }
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_) => FailureKind::Io,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::MalformedAddress { .. } => {
                "Use an IPv4 literal, a bracketed IPv6 literal ([::1]:port), or a bare IPv6 literal without a port."
            }
            Error::InspectionUnsupported(_) => {
                "Socket table introspection needs Linux procfs. Run on Linux to exercise bind scenarios."
            }
            Error::ProcessGone { .. } => {
                "The target exited before its sockets could be inspected. Check its stderr output."
            }
            Error::PermissionDenied { .. } => {
                "Run bindcheck as the same user as the target, or with CAP_SYS_PTRACE."
            }
            Error::StartupTimeout { .. } => {
                "Raise [lifecycle] startup_timeout_ms, or inspect the kept data directory (--keep-datadirs)."
            }
            Error::ShutdownTimeout { .. } => {
                "The target ignored the stop request and SIGTERM. It was force-killed."
            }
            Error::ProcessAlreadyRunning { .. } => {
                "Internal sequencing bug: stop the active target before starting another. Please report."
            }
            Error::ProcessExited { .. } => {
                "The target rejected its arguments or could not bind. Check the reported stderr tail."
            }
            Error::Spawn { .. } => {
                "Check that [target] binary points at an executable file."
            }
            Error::BindMismatch { .. } => {
                "The target bound a different socket set than its configuration asks for."
            }
            Error::AllowlistMismatch { .. } => {
                "The target's access control accepted or rejected an origin unexpectedly."
            }
            Error::ProtocolError(_) => {
                "The status query failed for a reason other than an origin denial. Check connectivity and credentials."
            }
            Error::Config(_) => {
                "Run 'bindcheck check' to validate configuration, or fix the TOML file."
            }
            Error::Io(_) => "Check disk space and permissions on the work directory. Retry the run.",
            Error::Json(_) => "Internal serialization failure. Please report with the run log.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::MalformedAddress { .. } => "Malformed Address",
            Error::InspectionUnsupported(_) => "Inspection Unsupported",
            Error::ProcessGone { .. } => "Process Not Found",
            Error::PermissionDenied { .. } => "Permission Denied",
            Error::StartupTimeout { .. } => "Startup Timeout",
            Error::ShutdownTimeout { .. } => "Shutdown Timeout",
            Error::ProcessAlreadyRunning { .. } => "Process Already Running",
            Error::ProcessExited { .. } => "Target Exited",
            Error::Spawn { .. } => "Spawn Failed",
            Error::BindMismatch { .. } => "Bind Mismatch",
            Error::AllowlistMismatch { .. } => "Allow-list Mismatch",
            Error::ProtocolError(_) => "Protocol Error",
            Error::Config(_) => "Configuration Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Report classification if this error fails a scenario.
    pub failure_kind: FailureKind,

    /// Additional structured context (e.g., pid, expected/actual sets).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::MalformedAddress { input, .. } => {
                context.insert("input".to_string(), serde_json::json!(input));
            }
            Error::ProcessGone { pid }
            | Error::PermissionDenied { pid }
            | Error::ProcessAlreadyRunning { pid } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
            }
            Error::StartupTimeout { timeout_ms } => {
                context.insert("timeout_ms".to_string(), serde_json::json!(timeout_ms));
            }
            Error::ShutdownTimeout { pid, timeout_ms } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
                context.insert("timeout_ms".to_string(), serde_json::json!(timeout_ms));
            }
            Error::BindMismatch { expected, actual } => {
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::AllowlistMismatch { expected, observed } => {
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("observed".to_string(), serde_json::json!(observed));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            failure_kind: err.failure_kind(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
