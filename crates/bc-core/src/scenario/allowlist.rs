//! Access-control verification: probe the target from a chosen origin.

use std::time::Duration;

use bc_common::ProcessId;
use tracing::info;

use super::{base_options, release, AllowlistScenario, Execution, ExpectedOutcome, ScenarioOutcome};
use crate::addr::{canonicalize, CanonicalAddress};
use crate::node::ProcessController;
use crate::rpc::{ProbeOutcome, RpcClient};

/// Runs [`AllowlistScenario`]s against a controller.
pub struct AllowlistScenarioRunner<'a> {
    controller: &'a mut ProcessController,
    probe_timeout: Duration,
}

impl<'a> AllowlistScenarioRunner<'a> {
    pub fn new(controller: &'a mut ProcessController, probe_timeout: Duration) -> Self {
        AllowlistScenarioRunner {
            controller,
            probe_timeout,
        }
    }

    pub fn run(&mut self, scenario: &AllowlistScenario) -> Execution {
        let mut pid = None;
        let result = self.attempt(scenario, &mut pid);
        let (result, stop) = release(self.controller, result);
        let outcome = match result {
            Ok(observed) => {
                info!(scenario = %scenario.name, %observed, "probe outcome as expected");
                ScenarioOutcome::Pass
            }
            Err(err) => ScenarioOutcome::from_error(&err),
        };
        Execution { outcome, pid, stop }
    }

    fn attempt(
        &mut self,
        scenario: &AllowlistScenario,
        pid_out: &mut Option<ProcessId>,
    ) -> Result<ProbeOutcome, bc_common::Error> {
        let default_port = self.controller.settings().ports.rpc;
        let destination = canonicalize(&scenario.destination, default_port)?.socket_addr();

        // No explicit binds; readiness goes through the default loopback.
        let options = base_options(
            &scenario.allow_list,
            CanonicalAddress::ipv4_loopback(default_port).socket_addr(),
        );
        let credentials = self.controller.settings().credentials.clone();

        let pid = self.controller.start(&options)?.pid();
        *pid_out = Some(pid);

        let client = RpcClient::new(destination, credentials)
            .with_source(scenario.source)
            .with_timeout(self.probe_timeout);
        let observed = client.probe();
        info!(%pid, source = %scenario.source, %destination, %observed, "probe finished");

        judge(scenario.expected, observed)
    }
}

/// Compare a probe outcome against the expectation.
fn judge(expected: ExpectedOutcome, observed: ProbeOutcome) -> Result<ProbeOutcome, bc_common::Error> {
    match (&observed, expected) {
        (ProbeOutcome::Permit, ExpectedOutcome::Permit)
        | (ProbeOutcome::ConfirmedDeny { .. }, ExpectedOutcome::ConfirmedDeny) => Ok(observed),
        (ProbeOutcome::Unclassified { reason }, _) => {
            Err(bc_common::Error::ProtocolError(reason.clone()))
        }
        _ => Err(bc_common::Error::AllowlistMismatch {
            expected: expected.label().to_string(),
            observed: observed.label().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deny() -> ProbeOutcome {
        ProbeOutcome::ConfirmedDeny {
            signature: "non-JSON HTTP response with '403 Forbidden' from server".into(),
        }
    }

    #[test]
    fn test_matching_outcomes_pass() {
        assert!(judge(ExpectedOutcome::Permit, ProbeOutcome::Permit).is_ok());
        assert!(judge(ExpectedOutcome::ConfirmedDeny, deny()).is_ok());
    }

    #[test]
    fn test_opposite_outcome_is_mismatch() {
        let err = judge(ExpectedOutcome::ConfirmedDeny, ProbeOutcome::Permit).unwrap_err();
        match err {
            bc_common::Error::AllowlistMismatch { expected, observed } => {
                assert_eq!(expected, "confirmed_deny");
                assert_eq!(observed, "permit");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            judge(ExpectedOutcome::Permit, deny()),
            Err(bc_common::Error::AllowlistMismatch { .. })
        ));
    }

    #[test]
    fn test_unclassified_is_protocol_error() {
        let observed = ProbeOutcome::Unclassified {
            reason: "connection refused".into(),
        };
        for expected in [ExpectedOutcome::Permit, ExpectedOutcome::ConfirmedDeny] {
            assert!(matches!(
                judge(expected, observed.clone()),
                Err(bc_common::Error::ProtocolError(ref r)) if r == "connection refused"
            ));
        }
    }
}
