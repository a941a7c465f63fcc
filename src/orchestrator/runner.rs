use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{MomaError, Phase, Result};
use crate::stream::{
    CancellationSignal, CombinedLog, LineConsumer, POLL_INTERVAL, PumpContext, PumpReport,
    StreamPump,
};

/// Program plus arguments for one supervised phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl PhaseCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl std::fmt::Display for PhaseCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a supervised phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseExit {
    /// The child exited on its own. Killed-by-signal maps to -1.
    Exited(i32),
    /// The run was cancelled while the phase was active.
    Cancelled,
}

/// Exit plus the consumers handed back by both pumps.
#[derive(Debug)]
pub struct PhaseOutcome<O, E> {
    pub exit: PhaseExit,
    pub stdout: PumpReport<O>,
    pub stderr: PumpReport<E>,
    pub duration: Duration,
}

/// Spawns one child per phase and supervises it with a pump per stream.
#[derive(Debug, Clone)]
pub struct PhaseRunner {
    working_dir: PathBuf,
    log: CombinedLog,
    cancel: CancellationSignal,
    poll_interval: Duration,
}

impl PhaseRunner {
    pub fn new(working_dir: &Path, log: CombinedLog, cancel: CancellationSignal) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
            log,
            cancel,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn cancel_signal(&self) -> &CancellationSignal {
        &self.cancel
    }

    pub fn log(&self) -> &CombinedLog {
        &self.log
    }

    /// Run `command` to completion (or cancellation).
    ///
    /// Waits for both pumps before returning, so everything they read is in
    /// the combined log and their consumers are final. On cancellation the
    /// child is killed instead of awaited.
    pub async fn run<O, E>(
        &self,
        phase: Phase,
        command: &PhaseCommand,
        stdout_consumer: O,
        stderr_consumer: E,
    ) -> Result<PhaseOutcome<O, E>>
    where
        O: LineConsumer,
        E: LineConsumer,
    {
        debug!(%phase, "Running command: {}", command);
        let start = Instant::now();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MomaError::Spawn {
                program: command.program_name(),
                source,
            })?;
        debug!(%phase, pid = child.id().unwrap_or(0), "process spawned");

        let stdout = child.stdout.take().ok_or_else(|| MomaError::Pump {
            stream: "stdout",
            message: "stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| MomaError::Pump {
            stream: "stderr",
            message: "stderr was not captured".to_string(),
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let ctx = PumpContext {
            log: self.log.clone(),
            cancel: self.cancel.clone(),
            exit: exit_rx,
            poll_interval: self.poll_interval,
        };
        let stdout_task = tokio::spawn(
            StreamPump::new(stdout, "stdout", stdout_consumer, ctx.clone())
                .watch_lock_marker()
                .run(),
        );
        let stderr_task = tokio::spawn(StreamPump::new(stderr, "stderr", stderr_consumer, ctx).run());

        let mut exit = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| MomaError::Pump {
                    stream: "process",
                    message: format!("failed to wait for {}: {}", command.program_name(), e),
                })?;
                let _ = exit_tx.send(Some(status));
                PhaseExit::Exited(status.code().unwrap_or(-1))
            }
            () = self.cancel.cancelled() => {
                if let Err(e) = child.start_kill() {
                    warn!(%phase, "Failed to kill cancelled process: {}", e);
                }
                PhaseExit::Cancelled
            }
        };

        let stdout = join_pump("stdout", stdout_task).await?;
        let stderr = join_pump("stderr", stderr_task).await?;

        // The lock line can arrive right before the child exits on its own.
        if self.cancel.is_cancelled() {
            exit = PhaseExit::Cancelled;
        }

        let duration = start.elapsed();
        debug!(
            %phase,
            ?exit,
            stdout_lines = stdout.lines,
            stderr_lines = stderr.lines,
            "phase finished in {:.1}s",
            duration.as_secs_f64()
        );

        Ok(PhaseOutcome {
            exit,
            stdout,
            stderr,
            duration,
        })
    }
}

async fn join_pump<C>(
    stream: &'static str,
    task: JoinHandle<std::io::Result<PumpReport<C>>>,
) -> Result<PumpReport<C>> {
    match task.await {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => Err(MomaError::Pump {
            stream,
            message: e.to_string(),
        }),
        Err(e) => Err(MomaError::Pump {
            stream,
            message: format!("task panicked: {}", e),
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::stream::Capture;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn runner(dir: &TempDir) -> PhaseRunner {
        let log = CombinedLog::create(&dir.path().join("job.log")).unwrap();
        PhaseRunner::new(dir.path(), log, CancellationSignal::new())
            .with_poll_interval(Duration::from_millis(20))
    }

    fn sh(script: &str) -> PhaseCommand {
        PhaseCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_command_display() {
        let cmd = PhaseCommand::new("/opt/moris/mpirun")
            .arg("-np")
            .arg("4")
            .arg("beam.so");
        assert_eq!(cmd.to_string(), "/opt/moris/mpirun -np 4 beam.so");
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let dir = tempdir().unwrap();
        let runner = runner(&dir);
        let outcome = runner
            .run(
                Phase::Run,
                &sh("echo out-1; echo err-1 >&2; echo out-2"),
                Capture::new(),
                Capture::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.exit, PhaseExit::Exited(0));
        assert_eq!(outcome.stdout.consumer.lines(), ["out-1", "out-2"]);
        assert_eq!(outcome.stderr.consumer.lines(), ["err-1"]);

        let logged = fs::read_to_string(runner.log().path()).unwrap();
        for line in ["out-1", "out-2", "err-1"] {
            assert!(logged.lines().any(|l| l == line), "missing {line}");
        }
    }

    #[tokio::test]
    async fn test_reports_nonzero_exit() {
        let dir = tempdir().unwrap();
        let outcome = runner(&dir)
            .run(Phase::Build, &sh("echo failing; exit 3"), Capture::new(), Capture::new())
            .await
            .unwrap();
        assert_eq!(outcome.exit, PhaseExit::Exited(3));
        assert_eq!(outcome.stdout.consumer.text(), "failing");
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempdir().unwrap();
        let outcome = runner(&dir)
            .run(Phase::Build, &sh("touch made-here"), Capture::new(), Capture::new())
            .await
            .unwrap();
        assert_eq!(outcome.exit, PhaseExit::Exited(0));
        assert!(dir.path().join("made-here").exists());
    }

    #[tokio::test]
    async fn test_lock_marker_cancels_long_running_child() {
        let dir = tempdir().unwrap();
        let runner = runner(&dir);
        let started = Instant::now();
        let outcome = runner
            .run(
                Phase::Run,
                &sh("echo 'Warning: lock file .moris.lock found'; sleep 30; echo never"),
                Capture::new(),
                Capture::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.exit, PhaseExit::Cancelled);
        assert!(outcome.stdout.lock_detected);
        assert!(runner.cancel_signal().is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(outcome.stdout.consumer.lines().is_empty());
    }

    #[tokio::test]
    async fn test_lock_marker_wins_over_clean_exit() {
        let dir = tempdir().unwrap();
        let outcome = runner(&dir)
            .run(
                Phase::Run,
                &sh("echo 'Warning: lock file x'; exit 0"),
                Capture::new(),
                Capture::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.exit, PhaseExit::Cancelled);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempdir().unwrap();
        let err = runner(&dir)
            .run(
                Phase::Run,
                &PhaseCommand::new(dir.path().join("no-such-binary")),
                Capture::new(),
                Capture::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MomaError::Spawn { .. }));
    }
}
