//! Newton iteration extraction from the moris solver output.
//!
//! moris prints the metrics of one nonlinear iteration across several lines:
//!
//! ```text
//! Newton - Iteration: 3
//! ResidualNorm: 1.2e-04
//! SolutionNorm: 3.0e-05
//! RelResidualDrop: 0.001
//! Relaxation: 1.0
//! LoadFactor: 1.0
//! Newton - IterationTime: 0.5
//! ```
//!
//! `ConvergenceExtractor` collects those fields one line at a time and hands
//! back a `ConvergenceRecord` once every field has been seen.

use regex::Regex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

use crate::errors::{MomaError, Result};
use crate::util::{format_csv_number, format_scientific};

/// CSV column names, in the order rows are written.
pub const FIELD_NAMES: [&str; 7] = [
    "Iteration",
    "ResidualNorm",
    "SolutionNorm",
    "RelResidualDrop",
    "Relaxation",
    "LoadFactor",
    "Time",
];

const NUMBER: &str = r"[+\-]?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+\-]?\d+)?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Iteration,
    LoadFactor,
    ResidualNorm,
    SolutionNorm,
    RelResidualDrop,
    Relaxation,
    Time,
}

// Order matters: the first pattern that matches a line wins.
static FIELD_PATTERNS: LazyLock<Vec<(Field, Regex)>> = LazyLock::new(|| {
    let numeric = |prefix: &str| Regex::new(&format!(r"^.*{}: ({}).*", prefix, NUMBER)).unwrap();
    vec![
        (
            Field::Iteration,
            Regex::new(r"^.*Newton - Iteration: (\d+).*").unwrap(),
        ),
        (Field::LoadFactor, numeric("LoadFactor")),
        (Field::ResidualNorm, numeric("(?:ResidualNorm|ReferenceNorm)")),
        (Field::SolutionNorm, numeric("SolutionNorm")),
        (Field::RelResidualDrop, numeric("RelResidualDrop")),
        (Field::Relaxation, numeric(r"Relaxation(?:\s.*)?")),
        (Field::Time, numeric("Newton - IterationTime")),
    ]
});

/// Metrics of one Newton iteration. Unset fields have not been observed yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceRecord {
    pub iteration: Option<u64>,
    pub residual_norm: Option<f64>,
    pub solution_norm: Option<f64>,
    pub rel_residual_drop: Option<f64>,
    pub relaxation: Option<f64>,
    pub load_factor: Option<f64>,
    pub time: Option<f64>,
}

impl ConvergenceRecord {
    /// Every field except `Iteration`, in column order.
    pub fn metrics(&self) -> [(&'static str, Option<f64>); 6] {
        [
            (FIELD_NAMES[1], self.residual_norm),
            (FIELD_NAMES[2], self.solution_norm),
            (FIELD_NAMES[3], self.rel_residual_drop),
            (FIELD_NAMES[4], self.relaxation),
            (FIELD_NAMES[5], self.load_factor),
            (FIELD_NAMES[6], self.time),
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.iteration.is_some() && self.metrics().iter().all(|(_, v)| v.is_some())
    }

    /// The record as CSV cells in column order. Unset fields are empty.
    pub fn csv_record(&self) -> Vec<String> {
        let mut cells = vec![self.iteration.map(|i| i.to_string()).unwrap_or_default()];
        cells.extend(
            self.metrics()
                .iter()
                .map(|(_, v)| v.map(format_csv_number).unwrap_or_default()),
        );
        cells
    }

    fn set(&mut self, field: Field, raw: &str) -> bool {
        let slot = match field {
            Field::Iteration => {
                let Ok(iteration) = raw.parse() else {
                    return false;
                };
                *self = Self {
                    iteration: Some(iteration),
                    ..Self::default()
                };
                return true;
            }
            Field::LoadFactor => &mut self.load_factor,
            Field::ResidualNorm => &mut self.residual_norm,
            Field::SolutionNorm => &mut self.solution_norm,
            Field::RelResidualDrop => &mut self.rel_residual_drop,
            Field::Relaxation => &mut self.relaxation,
            Field::Time => &mut self.time,
        };
        match raw.parse() {
            Ok(value) => {
                *slot = Some(value);
                true
            }
            Err(_) => false,
        }
    }
}

/// Human readable block, two metrics per row:
///
/// ```text
/// Newton Iteration 3:
///   ResidualNorm    : 1.2000e-04    SolutionNorm    : 3.0000e-05
/// ```
impl std::fmt::Display for ConvergenceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.iteration {
            Some(i) => write!(f, "Newton Iteration {}:", i)?,
            None => write!(f, "Newton Iteration ?:")?,
        }
        for (column, (name, value)) in self.metrics().iter().enumerate() {
            if column % 2 == 0 {
                writeln!(f)?;
            }
            let value = value
                .map(|v| format_scientific(v, 4))
                .unwrap_or_else(|| "-".to_string());
            write!(f, "  {:<16}: {}  ", name, value)?;
        }
        Ok(())
    }
}

/// Append-only CSV file of completed records.
struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvSink {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| MomaError::io(path, e))?;
        let mut sink = Self {
            path: path.to_path_buf(),
            writer: csv::Writer::from_writer(file),
        };
        sink.append(FIELD_NAMES)
            .map_err(|e| MomaError::io(path, e.into()))?;
        Ok(sink)
    }

    fn append<I, T>(&mut self, record: I) -> csv::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Incremental state machine turning solver output lines into
/// `ConvergenceRecord`s.
pub struct ConvergenceExtractor {
    current: ConvergenceRecord,
    csv: Option<CsvSink>,
    emitted: usize,
}

impl ConvergenceExtractor {
    /// Extractor that keeps no persisted history.
    pub fn new() -> Self {
        Self {
            current: ConvergenceRecord::default(),
            csv: None,
            emitted: 0,
        }
    }

    /// Extractor that (re)creates `path` with the header row and appends one
    /// row per completed record.
    pub fn with_csv(path: &Path) -> Result<Self> {
        Ok(Self {
            csv: Some(CsvSink::create(path)?),
            ..Self::new()
        })
    }

    /// Feed one line. Returns the record it completed, if any.
    pub fn observe(&mut self, line: &str) -> Option<ConvergenceRecord> {
        let updated = FIELD_PATTERNS.iter().find_map(|(field, pattern)| {
            pattern
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| (*field, m.as_str()))
        });
        let (field, raw) = updated?;
        if !self.current.set(field, raw) || !self.current.is_complete() {
            return None;
        }

        let record = std::mem::take(&mut self.current);
        self.emitted += 1;
        if let Some(csv) = self.csv.as_mut()
            && let Err(e) = csv.append(record.csv_record())
        {
            warn!(path = %csv.path.display(), "Failed to append convergence row: {}", e);
        }
        Some(record)
    }

    /// The partially filled record of the iteration in progress.
    pub fn current(&self) -> &ConvergenceRecord {
        &self.current
    }

    /// Number of records completed so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Default for ConvergenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}
