//! Build/run orchestration.
//!
//! One `moma run` walks through
//! `Idle -> BuildingArtifact -> (ArtifactOnlyExit | Running) -> Succeeded | Failed`.
//! Every phase is a child process supervised by a `PhaseRunner`; the outcome
//! of a phase is decided only after both of its stream pumps have been joined.

pub mod runner;

pub use runner::{PhaseCommand, PhaseExit, PhaseOutcome, PhaseRunner};

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{RunContext, Toolchain};
use crate::errors::{MomaError, Phase, Result};
use crate::filter::LogReducer;
use crate::stream::{CancellationSignal, Capture, CombinedLog, ErrorReporter, POLL_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    BuildingArtifact,
    ArtifactOnlyExit,
    Running,
    Succeeded,
    Failed,
}

/// What a successful invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Only the shared object was built.
    ArtifactOnly,
    /// moris ran to completion.
    Completed { iterations: usize },
}

pub struct Orchestrator {
    ctx: RunContext,
    toolchain: Toolchain,
    cancel: CancellationSignal,
    poll_interval: Duration,
    state: RunState,
}

impl Orchestrator {
    pub fn new(ctx: RunContext, toolchain: Toolchain) -> Self {
        Self {
            ctx,
            toolchain,
            cancel: CancellationSignal::new(),
            poll_interval: POLL_INTERVAL,
            state: RunState::Idle,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Handle that cancels the current phase when triggered.
    pub fn cancel_signal(&self) -> CancellationSignal {
        self.cancel.clone()
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn execute(&mut self) -> Result<RunOutcome> {
        let result = self.drive().await;
        if result.is_err() {
            self.transition(RunState::Failed);
        }
        result
    }

    async fn drive(&mut self) -> Result<RunOutcome> {
        let log = CombinedLog::create(&self.ctx.log_file)?;
        let runner = PhaseRunner::new(&self.ctx.project_dir, log, self.cancel.clone())
            .with_poll_interval(self.poll_interval);

        if self.ctx.run_only {
            debug!(project = %self.ctx.project, "skipping shared object build");
        } else {
            self.transition(RunState::BuildingArtifact);
            self.build_artifact(&runner).await?;
        }

        if self.ctx.shared_object_only {
            self.transition(RunState::ArtifactOnlyExit);
            return Ok(RunOutcome::ArtifactOnly);
        }

        self.transition(RunState::Running);
        let iterations = self.run_moris(&runner).await?;
        self.transition(RunState::Succeeded);
        Ok(RunOutcome::Completed { iterations })
    }

    async fn build_artifact(&self, runner: &PhaseRunner) -> Result<()> {
        for stale in [self.ctx.artifact.clone(), self.ctx.object_file()] {
            match std::fs::remove_file(&stale) {
                Ok(()) => debug!(file = %stale.display(), "removed stale build output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(MomaError::io(stale, e)),
            }
        }

        if !self.ctx.source_file.is_file() {
            warn!(
                "{} not found, the shared object build will most likely fail",
                self.ctx.source_file.display()
            );
        }

        let script = self.toolchain.shared_object_script();
        if !script.is_file() {
            return Err(MomaError::EnvironmentMissing(format!(
                "Shared object script not found at {}",
                script.display()
            )));
        }
        let command = PhaseCommand::new(script)
            .arg(".")
            .arg(self.toolchain.build_dir.as_str())
            .arg(self.ctx.project.as_str())
            .arg(" ");

        info!(project = %self.ctx.project, build = %self.ctx.build_type, "Creating shared object");
        let outcome = runner
            .run(Phase::Build, &command, Capture::new(), ErrorReporter)
            .await?;

        match outcome.exit {
            PhaseExit::Cancelled => Err(self.lock_detected(Phase::Build)),
            PhaseExit::Exited(0) if self.ctx.artifact.is_file() => {
                info!(
                    project = %self.ctx.project,
                    "Shared object created for {} in {:.1}s",
                    self.ctx.project,
                    outcome.duration.as_secs_f64()
                );
                Ok(())
            }
            PhaseExit::Exited(code) => {
                debug!(code, "shared object build did not produce {}", self.ctx.artifact.display());
                Err(MomaError::ArtifactBuildFailed {
                    project: self.ctx.project.clone(),
                    log: outcome.stdout.consumer.text(),
                })
            }
        }
    }

    async fn run_moris(&self, runner: &PhaseRunner) -> Result<usize> {
        let moris = self.toolchain.moris_binary();
        if !moris.is_file() {
            return Err(MomaError::EnvironmentMissing(format!(
                "moris command not found at {}",
                moris.display()
            )));
        }
        if !self.ctx.artifact.is_file() {
            warn!(
                "{} does not exist, moris will most likely fail",
                self.ctx.artifact.display()
            );
        }

        let artifact = format!("{}.so", self.ctx.project);
        let command = if self.ctx.processors > 1 {
            PhaseCommand::new("mpirun")
                .arg("-np")
                .arg(self.ctx.processors.to_string())
                .arg(moris.display().to_string())
                .arg(artifact)
        } else {
            PhaseCommand::new(moris).arg(artifact)
        };

        info!(
            project = %self.ctx.project,
            processors = self.ctx.processors,
            "Running moris"
        );
        let reducer = LogReducer::with_csv(&self.ctx.csv_file)?;
        let outcome = runner
            .run(Phase::Run, &command, reducer, ErrorReporter)
            .await?;

        match outcome.exit {
            PhaseExit::Cancelled => Err(self.lock_detected(Phase::Run)),
            PhaseExit::Exited(0) => {
                let iterations = outcome.stdout.consumer.iterations();
                info!(
                    iterations,
                    "moris run completed successfully in {:.1}s",
                    outcome.duration.as_secs_f64()
                );
                Ok(iterations)
            }
            PhaseExit::Exited(exit_code) => Err(MomaError::RunFailed {
                exit_code,
                log_file: self.ctx.log_file.clone(),
            }),
        }
    }

    fn lock_detected(&self, phase: Phase) -> MomaError {
        MomaError::LockFileDetected {
            phase,
            log_file: self.ctx.log_file.clone(),
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}
