//! End-to-end scenarios: create a VM, wait for it, drive its console.
//!
//! A scenario walks through
//! `Created → AwaitingRunning → ConsoleOpen → ScriptRunning` and ends
//! `Passed` or `Failed`. It runs exactly once; the console session is
//! closed on every path before the report is produced.

use crate::batch::BatchScript;
use crate::console::{ConsoleSession, SessionConfig};
use crate::readiness::{ReadinessConfig, wait_running};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vmprobe_core::{Error, Platform, Result, VmHandle, VmSpec};

pub const DEFAULT_DEVICE: &str = "serial0";

/// One acceptance test case.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub spec: VmSpec,
    /// Serial device to attach to.
    pub device: String,
    pub script: BatchScript,
    /// Overall budget for the script.
    pub deadline: Duration,
}

impl Scenario {
    pub fn new(name: impl Into<String>, spec: VmSpec, script: BatchScript) -> Self {
        Self {
            name: name.into(),
            spec,
            device: DEFAULT_DEVICE.to_string(),
            script,
            deadline: Duration::from_secs(150),
        }
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStage {
    Created,
    AwaitingRunning,
    ConsoleOpen,
    ScriptRunning,
    Passed,
    Failed,
}

impl fmt::Display for ScenarioStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioStage::Created => "created",
            ScenarioStage::AwaitingRunning => "awaiting running",
            ScenarioStage::ConsoleOpen => "console open",
            ScenarioStage::ScriptRunning => "script running",
            ScenarioStage::Passed => "passed",
            ScenarioStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum ScenarioOutcome {
    Passed,
    Failed(Error),
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    pub vm: Option<VmHandle>,
    /// Last stage entered before the outcome was decided.
    pub stage: ScenarioStage,
    pub outcome: ScenarioOutcome,
    pub elapsed: Duration,
    /// Console output seen before the session closed.
    pub transcript: String,
    pub cleanup_error: Option<Error>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Passed)
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            ScenarioOutcome::Passed => None,
            ScenarioOutcome::Failed(e) => Some(e),
        }
    }

    pub fn final_stage(&self) -> ScenarioStage {
        if self.passed() {
            ScenarioStage::Passed
        } else {
            ScenarioStage::Failed
        }
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ScenarioOutcome::Passed => {
                write!(f, "PASS {} ({:.1}s)", self.name, self.elapsed.as_secs_f64())
            }
            ScenarioOutcome::Failed(e) => write!(
                f,
                "FAIL {} during {} ({:.1}s): {e}",
                self.name,
                self.stage,
                self.elapsed.as_secs_f64()
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub session: SessionConfig,
    pub readiness: ReadinessConfig,
    /// How long a VM may take to reach the running phase.
    pub ready_timeout: Duration,
    /// Delete the VM once the scenario finishes.
    pub cleanup: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            readiness: ReadinessConfig::default(),
            ready_timeout: Duration::from_secs(90),
            cleanup: true,
        }
    }
}

/// Runs scenarios against a platform.
pub struct ScenarioRunner {
    platform: Arc<dyn Platform>,
    config: ScenarioConfig,
    cancel: CancellationToken,
}

impl ScenarioRunner {
    pub fn new(platform: Arc<dyn Platform>, config: ScenarioConfig) -> Self {
        Self {
            platform,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts in-flight scenarios with [`Error::Cancelled`] when `token`
    /// fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let started = Instant::now();
        info!(scenario = %scenario.name, vm = %scenario.spec.name, "scenario starting");

        let mut progress = Progress {
            stage: ScenarioStage::Created,
            vm: None,
            transcript: String::new(),
        };
        let result = self.drive(scenario, &mut progress).await;

        let cleanup_error = match (&progress.vm, self.config.cleanup) {
            (Some(vm), true) => match self.platform.delete_vm(vm).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(scenario = %scenario.name, %vm, error = %e, "VM cleanup failed");
                    Some(e)
                }
            },
            _ => None,
        };

        let outcome = match result {
            Ok(()) => ScenarioOutcome::Passed,
            Err(e) => ScenarioOutcome::Failed(e),
        };
        let report = ScenarioReport {
            name: scenario.name.clone(),
            vm: progress.vm,
            stage: progress.stage,
            outcome,
            elapsed: started.elapsed(),
            transcript: progress.transcript,
            cleanup_error,
        };
        match &report.outcome {
            ScenarioOutcome::Passed => info!(scenario = %report.name, elapsed = ?report.elapsed, "scenario passed"),
            ScenarioOutcome::Failed(e) => warn!(
                scenario = %report.name,
                stage = %report.stage,
                error = %e,
                "scenario failed"
            ),
        }
        report
    }

    /// Runs each scenario once, in order.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> Vec<ScenarioReport> {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run(scenario).await);
        }
        reports
    }

    async fn drive(&self, scenario: &Scenario, progress: &mut Progress) -> Result<()> {
        let vm = self
            .cancellable(self.platform.create_vm(&scenario.spec))
            .await?;
        progress.vm = Some(vm.clone());

        progress.stage = ScenarioStage::AwaitingRunning;
        self.cancellable(wait_running(
            self.platform.as_ref(),
            &vm,
            self.config.ready_timeout,
            &self.config.readiness,
        ))
        .await?;

        progress.stage = ScenarioStage::ConsoleOpen;
        let stream = self
            .cancellable(self.platform.open_console(
                &vm,
                &scenario.device,
                self.config.session.connect_timeout,
            ))
            .await
            .map_err(|e| match e {
                Error::ConnectFailed { .. } | Error::Cancelled => e,
                other => Error::ConnectFailed {
                    target: format!("{vm}:{}", scenario.device),
                    reason: other.to_string(),
                },
            })?;
        let mut session =
            ConsoleSession::with_cancellation(stream, self.config.session.clone(), &self.cancel)
                .labelled(format!("{vm}:{}", scenario.device));

        progress.stage = ScenarioStage::ScriptRunning;
        let result = scenario.script.run(&mut session, scenario.deadline).await;
        progress.transcript = session.transcript();
        session.close().await?;
        result.map(|_| ())
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }
}

struct Progress {
    stage: ScenarioStage,
    vm: Option<VmHandle>,
    transcript: String,
}

/// Creates `spec`, waits for it, and runs `script` on its `serial0` console
/// with default settings.
pub async fn run_scenario(
    platform: Arc<dyn Platform>,
    spec: VmSpec,
    script: BatchScript,
    deadline: Duration,
) -> ScenarioReport {
    let scenario = Scenario::new(spec.name.clone(), spec, script).deadline(deadline);
    ScenarioRunner::new(platform, ScenarioConfig::default())
        .run(&scenario)
        .await
}
