//! Scenario runner and reports.
//!
//! The runner owns per-scenario setup and teardown: it launches the
//! sessions a scenario needs, runs it, and closes every session whatever
//! the outcome. Run-level setup and teardown of the application server is
//! [`ScenarioRunner::run_against_server`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::driver::{SessionDriver, SessionProvider};
use crate::result::ProbeResult;
use crate::scenario::{Scenario, ScenarioPhase};
use crate::server::{Endpoint, ServerHandle};

/// Result of running a single scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Whether the scenario passed
    pub passed: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Final phase, [`ScenarioPhase::Aborted`] on failure
    pub phase: ScenarioPhase,
    /// Last phase completed before the outcome
    pub reached: ScenarioPhase,
    /// Wall time, session launch and close included
    pub duration: Duration,
}

impl ScenarioReport {
    /// Create a passing report
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
            phase: ScenarioPhase::Asserted,
            reached: ScenarioPhase::Asserted,
            duration: Duration::ZERO,
        }
    }

    /// Create a failing report
    #[must_use]
    pub fn fail(name: impl Into<String>, reached: ScenarioPhase, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
            phase: ScenarioPhase::Aborted,
            reached,
            duration: Duration::ZERO,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Results from running several scenarios
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Individual scenario reports, in run order
    pub reports: Vec<ScenarioReport>,
    /// Total duration
    pub duration: Duration,
}

impl SuiteReport {
    /// Check if all scenarios passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(|r| r.passed)
    }

    /// Count passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.passed).count()
    }

    /// Count failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|r| !r.passed).count()
    }

    /// Get total scenario count
    #[must_use]
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Get failed scenarios
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioReport> {
        self.reports.iter().filter(|r| !r.passed).collect()
    }

    /// Report for the named scenario
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScenarioReport> {
        self.reports.iter().find(|r| r.name == name)
    }
}

/// Runs scenarios against sessions from one provider
#[derive(Debug)]
pub struct ScenarioRunner<P> {
    provider: P,
    config: HarnessConfig,
}

impl<P: SessionProvider> ScenarioRunner<P> {
    /// Create a runner
    #[must_use]
    pub const fn new(provider: P, config: HarnessConfig) -> Self {
        Self { provider, config }
    }

    /// Harness configuration
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Session provider
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Run one scenario on fresh sessions
    ///
    /// Never fails: errors end up in the report. Every launched session is
    /// closed before this returns.
    pub async fn run(&self, scenario: Scenario) -> ScenarioReport {
        let start = Instant::now();
        let mut phase = ScenarioPhase::Init;
        let mut sessions = Vec::with_capacity(scenario.participants());

        let outcome = match self.launch(scenario, &mut sessions).await {
            Ok(()) => scenario.run(&sessions, &self.config, &mut phase).await,
            Err(e) => Err(e),
        };

        for session in &mut sessions {
            if let Err(e) = session.close().await {
                warn!(scenario = scenario.name(), error = %e, "failed to close session");
            }
        }

        let report = match outcome {
            Ok(()) => {
                info!(scenario = scenario.name(), "scenario passed");
                ScenarioReport::pass(scenario.name())
            }
            Err(e) => {
                warn!(scenario = scenario.name(), reached = %phase, error = %e, "scenario failed");
                ScenarioReport::fail(scenario.name(), phase, e.to_string())
            }
        };
        report.with_duration(start.elapsed())
    }

    /// Run scenarios one after another
    ///
    /// A failing scenario never stops or affects the ones after it.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteReport {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run(*scenario).await);
        }
        let suite = SuiteReport {
            reports,
            duration: start.elapsed(),
        };
        info!(
            passed = suite.passed_count(),
            failed = suite.failed_count(),
            "suite finished"
        );
        suite
    }

    /// Bring up the application server, run `scenarios`, close the server
    ///
    /// Starts the configured server command, or attaches to a server
    /// already listening on the base URL when none is configured. The
    /// server is closed once after the last scenario.
    ///
    /// # Errors
    ///
    /// Returns the server startup error; scenario failures are reported in
    /// the [`SuiteReport`].
    pub async fn run_against_server(&self, scenarios: &[Scenario]) -> ProbeResult<SuiteReport> {
        let mut server = match &self.config.server {
            Some(server_config) => ServerHandle::start(server_config).await?,
            None => ServerHandle::attach(Endpoint::from_base_url(&self.config.base_url)?).await?,
        };

        let suite = self.run_all(scenarios).await;

        if let Err(e) = server.close().await {
            warn!(endpoint = %server.endpoint(), error = %e, "failed to close application server");
        }
        Ok(suite)
    }

    async fn launch(
        &self,
        scenario: Scenario,
        sessions: &mut Vec<P::Session>,
    ) -> ProbeResult<()> {
        for n in 1..=scenario.participants() {
            let options = self.config.session_options(&format!("driver{n}"));
            sessions.push(self.provider.launch(&options).await?);
        }
        Ok(())
    }
}
