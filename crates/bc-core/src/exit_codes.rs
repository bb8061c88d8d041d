//! Exit codes for the bindcheck CLI.
//!
//! Exit codes communicate the run outcome without requiring report parsing.
//!
//! Exit code ranges:
//! - 0-1: Run outcomes (clean, or at least one scenario failed)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use bc_common::{Error, ErrorCategory};

/// Exit codes for bindcheck operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Run Outcomes (0-1)
    // ========================================================================
    /// Every scenario passed or was skipped
    Clean = 0,

    /// At least one scenario failed
    ScenariosFailed = 1,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments (unknown scenario, malformed literal)
    ArgsError = 10,

    /// Required capability missing (no socket-table introspection)
    CapabilityError = 11,

    /// Configuration could not be loaded or failed validation
    ConfigError = 12,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// Operation timed out
    TimeoutError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ScenariosFailed => "ERR_SCENARIOS_FAILED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::CapabilityError => "ERR_CAPABILITY",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }

    /// Exit code for an error that aborted a command outside a scenario.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Address => ExitCode::ArgsError,
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Inspection => match err {
                Error::InspectionUnsupported(_) | Error::PermissionDenied { .. } => {
                    ExitCode::CapabilityError
                }
                _ => ExitCode::IoError,
            },
            ErrorCategory::Lifecycle => match err {
                Error::StartupTimeout { .. } | Error::ShutdownTimeout { .. } => {
                    ExitCode::TimeoutError
                }
                Error::ProcessAlreadyRunning { .. } => ExitCode::InternalError,
                _ => ExitCode::IoError,
            },
            ErrorCategory::Verification => ExitCode::ScenariosFailed,
            ErrorCategory::Io => match err {
                Error::Json(_) => ExitCode::InternalError,
                _ => ExitCode::IoError,
            },
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(!ExitCode::ScenariosFailed.is_success());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::TimeoutError.is_internal_error());
        assert!(!ExitCode::ArgsError.is_internal_error());
    }

    #[test]
    fn test_for_error() {
        let malformed = Error::MalformedAddress {
            input: "::1:80".into(),
            reason: "ambiguous".into(),
        };
        assert_eq!(ExitCode::for_error(&malformed), ExitCode::ArgsError);
        assert_eq!(
            ExitCode::for_error(&Error::InspectionUnsupported("macos".into())),
            ExitCode::CapabilityError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Config("bad".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::for_error(&Error::StartupTimeout { timeout_ms: 1 }),
            ExitCode::TimeoutError
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::ScenariosFailed.to_string(), "ERR_SCENARIOS_FAILED (1)");
        assert_eq!(i32::from(ExitCode::IoError), 21);
    }
}
