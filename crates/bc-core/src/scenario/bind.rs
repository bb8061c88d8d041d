//! Bind verification: compare what the target holds with what it was told.

use std::time::Duration;

use bc_common::ProcessId;
use tracing::{debug, info};

use super::{base_options, release, BindScenario, Execution, ScenarioOutcome};
use crate::addr::{canonicalize, equal_sets, BindSet};
use crate::collect::SocketInspector;
use crate::node::ProcessController;

/// Runs [`BindScenario`]s against a controller.
pub struct BindScenarioRunner<'a> {
    controller: &'a mut ProcessController,
    inspector: &'a SocketInspector,
    attempts: u32,
    backoff: Duration,
}

impl<'a> BindScenarioRunner<'a> {
    pub fn new(
        controller: &'a mut ProcessController,
        inspector: &'a SocketInspector,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        BindScenarioRunner {
            controller,
            inspector,
            attempts,
            backoff,
        }
    }

    pub fn run(&mut self, scenario: &BindScenario) -> Execution {
        let mut pid = None;
        let result = self.attempt(scenario, &mut pid);
        let (result, stop) = release(self.controller, result);
        let outcome = match result {
            Ok(actual) => {
                info!(scenario = %scenario.name, binds = %actual, "bind set matches");
                ScenarioOutcome::Pass
            }
            Err(err) => ScenarioOutcome::from_error(&err),
        };
        Execution { outcome, pid, stop }
    }

    fn attempt(
        &mut self,
        scenario: &BindScenario,
        pid_out: &mut Option<ProcessId>,
    ) -> Result<BindSet, bc_common::Error> {
        let default_port = self.controller.settings().ports.rpc;

        // Literals are checked before anything is launched.
        let expected = scenario
            .expected
            .iter()
            .map(|spec| canonicalize(spec, default_port))
            .collect::<Result<BindSet, _>>()?;
        let connect_to = canonicalize(&scenario.connect_to, default_port)?.socket_addr();

        let mut options = base_options(&scenario.allow_list, connect_to);
        options.rpc_bind = scenario.binds.clone();

        let pid = self.controller.start(&options)?.pid();
        *pid_out = Some(pid);

        let actual = self
            .inspector
            .wait_for_binds(pid, &expected, self.attempts, self.backoff)?;
        debug!(%pid, actual = %actual, expected = %expected, "inspected bind set");

        if equal_sets(&actual, &expected) {
            Ok(actual)
        } else {
            Err(bc_common::Error::BindMismatch {
                expected: expected.to_strings(),
                actual: actual.to_strings(),
            })
        }
    }
}
