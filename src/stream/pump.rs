use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::cancel::CancellationSignal;
use super::log::CombinedLog;
use super::reader::{LineReader, Polled};
use crate::filter::LogReducer;

/// How long a pump waits for a line before re-checking cancellation and
/// process exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Start of the line moris prints when it finds a lock file left behind by an
/// earlier run.
pub const LOCK_MARKER: &str = "Warning: lock file";

/// Receives the non-empty lines of one output stream.
pub trait LineConsumer: Send + 'static {
    fn consume(&mut self, line: &str);
}

impl LineConsumer for LogReducer {
    fn consume(&mut self, line: &str) {
        trace!("{}", line);
        if let Some(reduced) = self.observe(line) {
            info!("{}", reduced);
        }
    }
}

/// Reports every line at error level. Used for stderr.
#[derive(Debug, Default)]
pub struct ErrorReporter;

impl LineConsumer for ErrorReporter {
    fn consume(&mut self, line: &str) {
        error!("{}", line);
    }
}

/// Keeps every line so it can be shown if the phase fails.
#[derive(Debug, Default)]
pub struct Capture {
    lines: Vec<String>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl LineConsumer for Capture {
    fn consume(&mut self, line: &str) {
        debug!("{}", line);
        self.lines.push(line.to_string());
    }
}

/// Shared state a pump needs besides its stream and consumer.
#[derive(Debug, Clone)]
pub struct PumpContext {
    pub log: CombinedLog,
    pub cancel: CancellationSignal,
    pub exit: watch::Receiver<Option<ExitStatus>>,
    pub poll_interval: Duration,
}

/// What a pump hands back when it stops.
#[derive(Debug)]
pub struct PumpReport<C> {
    pub consumer: C,
    pub lines: usize,
    pub lock_detected: bool,
}

/// Moves lines from one child stream into the combined log and a consumer.
pub struct StreamPump<R, C> {
    reader: LineReader<R>,
    consumer: C,
    watch_lock: bool,
    ctx: PumpContext,
}

impl<R, C> StreamPump<R, C>
where
    R: AsyncRead + Unpin + Send + 'static,
    C: LineConsumer,
{
    pub fn new(stream: R, name: &'static str, consumer: C, ctx: PumpContext) -> Self {
        Self {
            reader: LineReader::new(stream, name),
            consumer,
            watch_lock: false,
            ctx,
        }
    }

    /// Also scan for the stale lock marker and cancel the run when it shows up.
    pub fn watch_lock_marker(mut self) -> Self {
        self.watch_lock = true;
        self
    }

    /// Pump until the stream closes, the child has exited with nothing left
    /// to read, or the run is cancelled.
    pub async fn run(mut self) -> std::io::Result<PumpReport<C>> {
        let name = self.reader.name();
        let mut lines = 0;
        let mut lock_detected = false;
        let mut log_failed = false;

        while !self.ctx.cancel.is_cancelled() {
            let line = match self.reader.poll_line(self.ctx.poll_interval).await? {
                Polled::Line(line) => line,
                Polled::Pending => {
                    if self.child_exited() && !self.reader.has_pending() {
                        break;
                    }
                    continue;
                }
                Polled::Closed => break,
            };

            lines += 1;
            if let Err(e) = self.ctx.log.write_line(&line)
                && !log_failed
            {
                log_failed = true;
                warn!(log = %self.ctx.log.path().display(), "Failed to write {} to log: {}", name, e);
            }

            if self.watch_lock && line.starts_with(LOCK_MARKER) {
                error!(
                    "{}\nmoris found a stale lock file. Remove the lock file named above \
                     and restart with `moma run`.",
                    line
                );
                self.ctx.cancel.trigger();
                lock_detected = true;
                break;
            }

            if line.is_empty() || self.ctx.cancel.is_cancelled() {
                continue;
            }
            self.consumer.consume(&line);
        }

        debug!(stream = name, lines, lock_detected, "pump stopped");
        Ok(PumpReport {
            consumer: self.consumer,
            lines,
            lock_detected,
        })
    }

    fn child_exited(&self) -> bool {
        self.ctx.exit.borrow().is_some()
    }
}
