//! Scenario definitions, runners and reporting.
//!
//! A scenario is a literal record: the allow-list and bind flags a target is
//! started with, and what the harness expects to observe. Runners turn a
//! scenario into a [`ScenarioResult`]; failures of any layer underneath are
//! caught here and classified, so one broken scenario never aborts the run.

mod allowlist;
mod bind;
pub mod catalog;
pub mod report;
mod runner;

pub use allowlist::AllowlistScenarioRunner;
pub use bind::BindScenarioRunner;
pub use catalog::ScenarioCatalog;
pub use report::{RunReport, RunSummary};
pub use runner::{CatalogRunner, RunnerSettings};

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use bc_common::{FailureKind, ProcessId};
use serde::Serialize;
use tracing::warn;

use crate::capabilities::Requirement;
use crate::node::{NodeError, NodeOptions, ProcessController, StopOutcome};

/// Checks the sockets a target binds for a given configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindScenario {
    pub name: String,
    /// `rpcallowip` entries.
    pub allow_list: Vec<String>,
    /// Address spec readiness and shutdown requests go to.
    pub connect_to: String,
    /// `rpcbind` entries.
    pub binds: Vec<String>,
    /// Address specs of the endpoints the target must hold, nothing more.
    pub expected: Vec<String>,
    pub requires: Vec<Requirement>,
}

/// Checks whether a status query from `source` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowlistScenario {
    pub name: String,
    pub allow_list: Vec<String>,
    /// Local address the probe connects from.
    pub source: IpAddr,
    /// Address spec the probe connects to.
    pub destination: String,
    pub expected: ExpectedOutcome,
    pub requires: Vec<Requirement>,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    Bind(BindScenario),
    Allowlist(AllowlistScenario),
}

impl Scenario {
    pub fn name(&self) -> &str {
        match self {
            Scenario::Bind(s) => &s.name,
            Scenario::Allowlist(s) => &s.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scenario::Bind(_) => "bind",
            Scenario::Allowlist(_) => "allowlist",
        }
    }

    /// Host requirements, including the implicit introspection need of
    /// bind scenarios.
    pub fn requirements(&self) -> Vec<Requirement> {
        match self {
            Scenario::Bind(s) => {
                let mut reqs = s.requires.clone();
                if !reqs.contains(&Requirement::Introspection) {
                    reqs.push(Requirement::Introspection);
                }
                reqs
            }
            Scenario::Allowlist(s) => s.requires.clone(),
        }
    }

    /// One-line description for `list`.
    pub fn describe(&self) -> String {
        match self {
            Scenario::Bind(s) => format!(
                "allow=[{}] binds=[{}] connect={} expect {{{}}}",
                s.allow_list.join(", "),
                s.binds.join(", "),
                s.connect_to,
                s.expected.join(", ")
            ),
            Scenario::Allowlist(s) => format!(
                "allow=[{}] from {} to {} expect {}",
                s.allow_list.join(", "),
                s.source,
                s.destination,
                s.expected
            ),
        }
    }
}

/// Expected result of an allow-list probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Permit,
    ConfirmedDeny,
}

impl ExpectedOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExpectedOutcome::Permit => "permit",
            ExpectedOutcome::ConfirmedDeny => "confirmed_deny",
        }
    }
}

impl fmt::Display for ExpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Pass,
    Fail {
        kind: FailureKind,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actual: Option<String>,
    },
    Skipped {
        reason: String,
    },
}

impl ScenarioOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioOutcome::Pass => "pass",
            ScenarioOutcome::Fail { .. } => "fail",
            ScenarioOutcome::Skipped { .. } => "skipped",
        }
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, ScenarioOutcome::Fail { .. })
    }

    /// Classify an error caught at the scenario boundary.
    pub fn from_error(err: &bc_common::Error) -> Self {
        if err.is_skip() {
            return ScenarioOutcome::Skipped {
                reason: err.to_string(),
            };
        }
        let (expected, actual) = match err {
            bc_common::Error::BindMismatch { expected, actual } => (
                Some(format!("{{{}}}", expected.join(", "))),
                Some(format!("{{{}}}", actual.join(", "))),
            ),
            bc_common::Error::AllowlistMismatch { expected, observed } => {
                (Some(expected.clone()), Some(observed.clone()))
            }
            _ => (None, None),
        };
        ScenarioOutcome::Fail {
            kind: err.failure_kind(),
            reason: err.to_string(),
            expected,
            actual,
        }
    }
}

/// Per-scenario report entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    /// `bind` or `allowlist`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub outcome: ScenarioOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<ProcessId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopOutcome>,
}

/// What a runner observed besides the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub outcome: ScenarioOutcome,
    pub pid: Option<ProcessId>,
    pub stop: Option<StopOutcome>,
}

/// Base start options shared by both runners.
fn base_options(allow_list: &[String], connect_to: std::net::SocketAddr) -> NodeOptions {
    NodeOptions {
        disable_wallet: true,
        disable_auto_listen: true,
        rpc_allow_ip: allow_list.to_vec(),
        rpc_bind: Vec::new(),
        connect_to,
    }
}

/// Stop the target and fold the stop result into the scenario result.
///
/// The slot is always empty afterwards. A stop failure only fails the
/// scenario when the scenario itself succeeded.
fn release<T>(
    controller: &mut ProcessController,
    result: Result<T, bc_common::Error>,
) -> (Result<T, bc_common::Error>, Option<StopOutcome>) {
    let Some(pid) = controller.handle().map(|h| h.pid()) else {
        return (result, None);
    };
    let stopped = controller.stop();
    if stopped.is_err() {
        controller.force_kill();
    }
    settle(result, stopped, pid, controller.settings().shutdown_timeout)
}

/// Fold the way a target was stopped into the scenario result.
///
/// A target that had to be killed fails an otherwise passing scenario with
/// a shutdown timeout. An earlier failure stays the reported reason.
fn settle<T>(
    result: Result<T, bc_common::Error>,
    stopped: Result<StopOutcome, NodeError>,
    pid: ProcessId,
    timeout: Duration,
) -> (Result<T, bc_common::Error>, Option<StopOutcome>) {
    let (stop_err, outcome) = match stopped {
        Ok(StopOutcome::Forced) => {
            warn!(%pid, "target had to be killed");
            (
                Some(NodeError::ShutdownTimeout { pid, timeout }),
                Some(StopOutcome::Forced),
            )
        }
        Ok(outcome) => (None, Some(outcome)),
        Err(err) => {
            warn!(%pid, error = %err, "target did not stop cleanly");
            (Some(err), None)
        }
    };
    let result = match (result, stop_err) {
        (Ok(_), Some(err)) => Err(err.into()),
        (result, _) => result,
    };
    (result, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_requirements_include_introspection() {
        let s = Scenario::Bind(BindScenario {
            name: "x".into(),
            allow_list: vec![],
            connect_to: "127.0.0.1".into(),
            binds: vec![],
            expected: vec![],
            requires: vec![Requirement::Ipv6],
        });
        assert_eq!(
            s.requirements(),
            vec![Requirement::Ipv6, Requirement::Introspection]
        );
        assert_eq!(s.kind(), "bind");
    }

    #[test]
    fn test_skip_errors_become_skipped() {
        let err = bc_common::Error::InspectionUnsupported("no procfs".into());
        assert!(matches!(
            ScenarioOutcome::from_error(&err),
            ScenarioOutcome::Skipped { .. }
        ));
    }

    #[test]
    fn test_bind_mismatch_carries_sets() {
        let err = bc_common::Error::BindMismatch {
            expected: vec!["127.0.0.1:1".into()],
            actual: vec!["127.0.0.1:1".into(), "[::1]:1".into()],
        };
        match ScenarioOutcome::from_error(&err) {
            ScenarioOutcome::Fail {
                kind,
                expected,
                actual,
                ..
            } => {
                assert_eq!(kind, FailureKind::BindMismatch);
                assert_eq!(expected.as_deref(), Some("{127.0.0.1:1}"));
                assert_eq!(actual.as_deref(), Some("{127.0.0.1:1, [::1]:1}"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_startup_timeout_is_timeout_failure() {
        let err = bc_common::Error::StartupTimeout { timeout_ms: 10 };
        match ScenarioOutcome::from_error(&err) {
            ScenarioOutcome::Fail { kind, .. } => assert_eq!(kind, FailureKind::Timeout),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_forced_stop_fails_passing_scenario_as_timeout() {
        let (result, stop) = settle(
            Ok(()),
            Ok(StopOutcome::Forced),
            ProcessId(42),
            Duration::from_millis(500),
        );
        assert_eq!(stop, Some(StopOutcome::Forced));
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            bc_common::Error::ShutdownTimeout {
                pid: 42,
                timeout_ms: 500
            }
        ));
        match ScenarioOutcome::from_error(&err) {
            ScenarioOutcome::Fail { kind, .. } => assert_eq!(kind, FailureKind::Timeout),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_forced_stop_keeps_earlier_failure() {
        let earlier: Result<(), _> = Err(bc_common::Error::BindMismatch {
            expected: vec![],
            actual: vec!["0.0.0.0:1".into()],
        });
        let (result, stop) = settle(
            earlier,
            Ok(StopOutcome::Forced),
            ProcessId(42),
            Duration::from_millis(500),
        );
        assert_eq!(stop, Some(StopOutcome::Forced));
        assert!(matches!(
            result,
            Err(bc_common::Error::BindMismatch { .. })
        ));
    }

    #[test]
    fn test_graceful_stop_keeps_pass() {
        let (result, stop) = settle(
            Ok(7),
            Ok(StopOutcome::Graceful),
            ProcessId(42),
            Duration::from_secs(1),
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(stop, Some(StopOutcome::Graceful));
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = ScenarioResult {
            name: "n".into(),
            kind: "bind",
            outcome: ScenarioOutcome::Skipped {
                reason: "no IPv6".into(),
            },
            duration_ms: 0,
            pid: None,
            stop: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "no IPv6");
        assert_eq!(json["type"], "bind");
        assert!(json.get("pid").is_none());
    }
}
