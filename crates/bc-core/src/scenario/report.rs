//! Run report: per-scenario results, totals and the exit code.

use std::fmt::Write as _;

use bc_common::{OutputFormat, SCHEMA_VERSION};
use serde::Serialize;

use super::{ScenarioOutcome, ScenarioResult};
use crate::capabilities::HostCapabilities;
use crate::exit_codes::ExitCode;
use crate::node::PortAssignment;

/// Totals across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        let mut summary = RunSummary {
            total: results.len(),
            ..RunSummary::default()
        };
        for result in results {
            match result.outcome {
                ScenarioOutcome::Pass => summary.passed += 1,
                ScenarioOutcome::Fail { .. } => summary.failed += 1,
                ScenarioOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn status(&self) -> &'static str {
        if self.failed == 0 {
            "ok"
        } else {
            "failed"
        }
    }
}

/// Everything `bindcheck run` prints.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: &'static str,
    pub run_id: String,
    pub generated_at: String,
    pub status: &'static str,
    pub target: String,
    pub ports: PortAssignment,
    pub capabilities: HostCapabilities,
    pub summary: RunSummary,
    pub scenarios: Vec<ScenarioResult>,
}

impl RunReport {
    pub fn new(
        run_id: impl Into<String>,
        target: impl Into<String>,
        ports: PortAssignment,
        capabilities: HostCapabilities,
        scenarios: Vec<ScenarioResult>,
    ) -> Self {
        let summary = RunSummary::from_results(&scenarios);
        RunReport {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            status: summary.status(),
            target: target.into(),
            ports,
            capabilities,
            summary,
            scenarios,
        }
    }

    /// Zero when nothing failed; skips never fail a run.
    pub fn exit_code(&self) -> ExitCode {
        if self.summary.failed == 0 {
            ExitCode::Clean
        } else {
            ExitCode::ScenariosFailed
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Md => Ok(self.to_markdown()),
            OutputFormat::Summary => Ok(self.to_summary()),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# bindcheck run {}", self.run_id);
        let _ = writeln!(out);
        let _ = writeln!(out, "- Target: `{}`", self.target);
        let _ = writeln!(out, "- RPC port: {}", self.ports.rpc);
        let _ = writeln!(out, "- Host: {}", self.capabilities.summary());
        let _ = writeln!(out, "- Generated: {}", self.generated_at);
        let _ = writeln!(out);
        let _ = writeln!(out, "| Scenario | Status | Duration | Details |");
        let _ = writeln!(out, "|----------|--------|----------|---------|");
        for result in &self.scenarios {
            let _ = writeln!(
                out,
                "| {} | {} | {}ms | {} |",
                result.name,
                result.outcome.label(),
                result.duration_ms,
                escape_cell(&details(&result.outcome))
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "**{}** passed, **{}** failed, **{}** skipped of {}",
            self.summary.passed, self.summary.failed, self.summary.skipped, self.summary.total
        );
        out
    }

    pub fn to_summary(&self) -> String {
        let mut out = String::new();
        for result in &self.scenarios {
            let detail = details(&result.outcome);
            if detail.is_empty() {
                let _ = writeln!(out, "{:<8} {}", result.outcome.label().to_uppercase(), result.name);
            } else {
                let _ = writeln!(
                    out,
                    "{:<8} {}: {}",
                    result.outcome.label().to_uppercase(),
                    result.name,
                    detail
                );
            }
        }
        let _ = writeln!(
            out,
            "[{}] {}: {} passed, {} failed, {} skipped",
            self.run_id,
            self.status,
            self.summary.passed,
            self.summary.failed,
            self.summary.skipped
        );
        out
    }
}

fn details(outcome: &ScenarioOutcome) -> String {
    match outcome {
        ScenarioOutcome::Pass => String::new(),
        ScenarioOutcome::Skipped { reason } => reason.clone(),
        ScenarioOutcome::Fail {
            kind,
            reason,
            expected,
            actual,
        } => match (expected, actual) {
            (Some(expected), Some(actual)) => {
                format!("{kind}: expected {expected}, actual {actual}")
            }
            _ => format!("{kind}: {reason}"),
        },
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bc_common::FailureKind;
    use std::net::IpAddr;

    fn caps() -> HostCapabilities {
        HostCapabilities {
            os: "linux".into(),
            socket_introspection: true,
            ipv6_loopback: true,
            other_loopback_ip: IpAddr::from([127, 0, 0, 2]),
            other_loopback: true,
            detected_at: String::new(),
        }
    }

    fn result(name: &str, outcome: ScenarioOutcome) -> ScenarioResult {
        ScenarioResult {
            name: name.into(),
            kind: "bind",
            outcome,
            duration_ms: 5,
            pid: None,
            stop: None,
        }
    }

    fn report(results: Vec<ScenarioResult>) -> RunReport {
        RunReport::new(
            "run-000000000000",
            "/usr/bin/target",
            PortAssignment { rpc: 16000, p2p: 11000 },
            caps(),
            results,
        )
    }

    fn mismatch() -> ScenarioOutcome {
        ScenarioOutcome::Fail {
            kind: FailureKind::BindMismatch,
            reason: "bind mismatch".into(),
            expected: Some("{[::]:16000}".into()),
            actual: Some("{0.0.0.0:16000}".into()),
        }
    }

    #[test]
    fn test_skips_do_not_fail_run() {
        let r = report(vec![
            result("a", ScenarioOutcome::Pass),
            result(
                "b",
                ScenarioOutcome::Skipped {
                    reason: "no IPv6".into(),
                },
            ),
        ]);
        assert_eq!(r.summary.passed, 1);
        assert_eq!(r.summary.skipped, 1);
        assert_eq!(r.status, "ok");
        assert_eq!(r.exit_code(), ExitCode::Clean);
    }

    #[test]
    fn test_any_failure_fails_run() {
        let r = report(vec![result("a", ScenarioOutcome::Pass), result("b", mismatch())]);
        assert_eq!(r.summary.failed, 1);
        assert_eq!(r.status, "failed");
        assert_eq!(r.exit_code(), ExitCode::ScenariosFailed);
    }

    #[test]
    fn test_json_shape() {
        let r = report(vec![result("b", mismatch())]);
        let json: serde_json::Value =
            serde_json::from_str(&r.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["schema_version"], SCHEMA_VERSION);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["scenarios"][0]["status"], "fail");
        assert_eq!(json["scenarios"][0]["kind"], "bind_mismatch");
        assert_eq!(json["scenarios"][0]["actual"], "{0.0.0.0:16000}");
        assert_eq!(json["ports"]["rpc"], 16000);
    }

    #[test]
    fn test_markdown_table() {
        let md = report(vec![result("b", mismatch())]).to_markdown();
        assert!(md.contains("| Scenario | Status |"));
        assert!(md.contains("| b | fail | 5ms | bind_mismatch: expected {[::]:16000}, actual {0.0.0.0:16000} |"));
        assert!(md.contains("**0** passed, **1** failed"));
    }

    #[test]
    fn test_summary_lines() {
        let text = report(vec![result("a", ScenarioOutcome::Pass), result("b", mismatch())])
            .to_summary();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "PASS     a");
        assert!(lines[1].starts_with("FAIL     b: bind_mismatch"));
        assert_eq!(lines[2], "[run-000000000000] failed: 1 passed, 1 failed, 0 skipped");
    }
}
