//! Sequential catalog execution.

use std::time::{Duration, Instant};

use tracing::{info, info_span, warn};

use super::{
    AllowlistScenarioRunner, BindScenarioRunner, Execution, Scenario, ScenarioCatalog,
    ScenarioOutcome, ScenarioResult,
};
use crate::capabilities::HostCapabilities;
use crate::collect::SocketInspector;
use crate::config::HarnessConfig;
use crate::node::ProcessController;

/// Retry and timeout knobs for the scenario runners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    pub inspect_attempts: u32,
    pub inspect_backoff: Duration,
    pub probe_timeout: Duration,
}

impl RunnerSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        RunnerSettings {
            inspect_attempts: config.inspect.attempts,
            inspect_backoff: config.inspect_backoff(),
            probe_timeout: config.rpc_timeout(),
        }
    }
}

/// Runs scenarios one after another through a single controller.
pub struct CatalogRunner {
    controller: ProcessController,
    inspector: SocketInspector,
    capabilities: HostCapabilities,
    settings: RunnerSettings,
}

impl CatalogRunner {
    pub fn new(
        controller: ProcessController,
        inspector: SocketInspector,
        capabilities: HostCapabilities,
        settings: RunnerSettings,
    ) -> Self {
        CatalogRunner {
            controller,
            inspector,
            capabilities,
            settings,
        }
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    /// Run every scenario in order. Never stops early.
    pub fn run(&mut self, catalog: &ScenarioCatalog) -> Vec<ScenarioResult> {
        catalog
            .scenarios()
            .iter()
            .map(|scenario| self.run_one(scenario))
            .collect()
    }

    pub fn run_one(&mut self, scenario: &Scenario) -> ScenarioResult {
        let span = info_span!("scenario", name = %scenario.name(), kind = scenario.kind());
        let _guard = span.enter();
        let started = Instant::now();

        let execution = match self.capabilities.unmet(&scenario.requirements()) {
            Some(reason) => {
                info!(%reason, "skipping scenario");
                Execution {
                    outcome: ScenarioOutcome::Skipped { reason },
                    pid: None,
                    stop: None,
                }
            }
            None => {
                info!(description = %scenario.describe(), "running scenario");
                self.execute(scenario)
            }
        };

        if self.controller.handle().is_some() {
            warn!("target still active after scenario; force-killing");
            self.controller.force_kill();
        }

        let result = ScenarioResult {
            name: scenario.name().to_string(),
            kind: scenario.kind(),
            outcome: execution.outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            pid: execution.pid,
            stop: execution.stop,
        };
        match &result.outcome {
            ScenarioOutcome::Fail { kind, reason, .. } => {
                warn!(%kind, %reason, duration_ms = result.duration_ms, "scenario failed")
            }
            outcome => info!(
                status = outcome.label(),
                duration_ms = result.duration_ms,
                "scenario finished"
            ),
        }
        result
    }

    fn execute(&mut self, scenario: &Scenario) -> Execution {
        match scenario {
            Scenario::Bind(s) => BindScenarioRunner::new(
                &mut self.controller,
                &self.inspector,
                self.settings.inspect_attempts,
                self.settings.inspect_backoff,
            )
            .run(s),
            Scenario::Allowlist(s) => {
                AllowlistScenarioRunner::new(&mut self.controller, self.settings.probe_timeout)
                    .run(s)
            }
        }
    }
}
