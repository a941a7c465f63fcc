//! Reduction of the moris stdout stream.
//!
//! The solver is chatty. `LogReducer` keeps only what is worth reading while a
//! job runs: completed Newton iterations and the final wall time. Section
//! markers are tracked but not echoed; everything else is dropped.

mod newton;
mod section;

pub use newton::{ConvergenceExtractor, ConvergenceRecord, FIELD_NAMES};
pub use section::{SectionEvent, SectionTracker, parse_section};

use std::path::Path;

use crate::errors::Result;

/// Prefix moris uses to report the total elapsed time.
pub const WALLTIME_PREFIX: &str = "Global Clock Stopped. ElapsedTime = ";

/// A line of the reduced log.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduced {
    Iteration(ConvergenceRecord),
    Walltime(String),
}

impl std::fmt::Display for Reduced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reduced::Iteration(record) => write!(f, "{}", record),
            Reduced::Walltime(walltime) => write!(f, "Walltime: {}", walltime),
        }
    }
}

pub struct LogReducer {
    sections: SectionTracker,
    newton: ConvergenceExtractor,
}

impl LogReducer {
    pub fn new(newton: ConvergenceExtractor) -> Self {
        Self {
            sections: SectionTracker::new(),
            newton,
        }
    }

    /// Reducer persisting completed iterations to `csv_path`.
    pub fn with_csv(csv_path: &Path) -> Result<Self> {
        Ok(Self::new(ConvergenceExtractor::with_csv(csv_path)?))
    }

    pub fn observe(&mut self, line: &str) -> Option<Reduced> {
        if self.sections.observe(line).is_some() {
            return None;
        }
        if let Some(record) = self.newton.observe(line) {
            return Some(Reduced::Iteration(record));
        }
        line.strip_prefix(WALLTIME_PREFIX)
            .map(|walltime| Reduced::Walltime(walltime.to_string()))
    }

    pub fn sections(&self) -> &[SectionEvent] {
        self.sections.history()
    }

    pub fn iterations(&self) -> usize {
        self.newton.emitted()
    }
}

impl Default for LogReducer {
    fn default() -> Self {
        Self::new(ConvergenceExtractor::new())
    }
}
