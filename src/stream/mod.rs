//! Capture of a child's stdout and stderr.
//!
//! Each stream gets its own `StreamPump` task. Both pumps append to the same
//! `CombinedLog` and watch the same `CancellationSignal`; they share nothing
//! else.
//!
//! ```text
//!   stdout ─▶ LineReader ─▶ StreamPump ─┬─▶ CombinedLog
//!                            (lock scan) └─▶ LogReducer
//!   stderr ─▶ LineReader ─▶ StreamPump ─┬─▶ CombinedLog
//!                                       └─▶ ErrorReporter
//! ```

mod cancel;
mod log;
mod pump;
mod reader;

pub use cancel::CancellationSignal;
pub use log::CombinedLog;
pub use pump::{
    Capture, ErrorReporter, LOCK_MARKER, LineConsumer, POLL_INTERVAL, PumpContext, PumpReport,
    StreamPump,
};
pub use reader::{LineReader, Polled};
