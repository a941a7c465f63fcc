//! Post-processing of a finished run.
//!
//! Projects can print their own tabular output into the moris log, each row
//! tagged with a marker (`RESULT: 1, 0.25, 3.5`). `extract_csv_from_log`
//! collects those rows into a CSV file.

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{MomaError, Result};

/// Options of `moma post extract`.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub marker: Option<String>,
    pub separator: String,
    pub header: Option<String>,
    pub output: PathBuf,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            marker: None,
            separator: ",".to_string(),
            header: None,
            output: PathBuf::new(),
        }
    }
}

impl ExtractOptions {
    fn delimiter(&self) -> Result<u8> {
        match self.separator.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(MomaError::ConfigurationMissing(format!(
                "Separator must be a single character, got {:?}",
                self.separator
            ))),
        }
    }
}

/// Lines of `log` that start with `marker`, with the marker removed and the
/// rest trimmed. Lines left empty are dropped.
pub fn marked_lines<'a>(log: &'a str, marker: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    log.lines()
        .filter_map(move |line| line.trim().strip_prefix(marker))
        .map(str::trim)
        .filter(|rest| !rest.is_empty())
}

/// Turn the marked lines of `log_file` into a comma separated file at
/// `options.output`. Returns the number of data rows written.
pub fn extract_csv_from_log(log_file: &Path, options: &ExtractOptions) -> Result<usize> {
    let marker = options.marker.as_deref().filter(|m| !m.is_empty()).ok_or_else(|| {
        MomaError::ConfigurationMissing("No marker for extraction provided".to_string())
    })?;
    let delimiter = options.delimiter()?;
    let log = std::fs::read_to_string(log_file).map_err(|_| {
        MomaError::ConfigurationMissing(format!(
            "Cannot extract from log file: {} not found",
            log_file.display()
        ))
    })?;

    let mut table = String::new();
    if let Some(header) = &options.header {
        table.push_str(header);
        table.push('\n');
    }
    for line in marked_lines(&log, marker) {
        table.push_str(line);
        table.push('\n');
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(options.header.is_some())
        .trim(csv::Trim::All)
        .from_reader(table.as_bytes());
    let file = File::create(&options.output).map_err(|e| MomaError::io(&options.output, e))?;
    let mut writer = csv::Writer::from_writer(file);
    let csv_error = |source| MomaError::Extract {
        path: options.output.clone(),
        source,
    };

    if options.header.is_some() {
        let header = reader.headers().map_err(csv_error)?.clone();
        writer.write_record(&header).map_err(csv_error)?;
    }
    let mut rows = 0;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        debug!("extracted: {}", record.iter().collect::<Vec<_>>().join(", "));
        writer.write_record(&record).map_err(csv_error)?;
        rows += 1;
    }
    writer
        .flush()
        .map_err(|e| MomaError::io(&options.output, e))?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const LOG: &str = "\
|__Model - Initialize - Mesh
RESULT: 1, 0.25, 3.5
Newton - Iteration: 1
  RESULT: 2,0.5,  4.0
RESULT:
OTHER: 9, 9, 9
RESULT: 3, 0.75, 4.5
";

    fn options(dir: &Path) -> ExtractOptions {
        ExtractOptions {
            marker: Some("RESULT:".to_string()),
            output: dir.join("results.csv"),
            ..Default::default()
        }
    }

    #[test]
    fn test_marked_lines_strip_marker() {
        let lines: Vec<&str> = marked_lines(LOG, "RESULT:").collect();
        assert_eq!(lines, ["1, 0.25, 3.5", "2,0.5,  4.0", "3, 0.75, 4.5"]);
    }

    #[test]
    fn test_marker_is_a_prefix_not_a_char_set() {
        let lines: Vec<&str> = marked_lines("RES: SEER 1,2\n", "RES:").collect();
        assert_eq!(lines, ["SEER 1,2"]);
    }

    #[test]
    fn test_extract_with_header() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("beam.log");
        fs::write(&log, LOG).unwrap();
        let opts = ExtractOptions {
            header: Some("step, load, displacement".to_string()),
            ..options(dir.path())
        };

        let rows = extract_csv_from_log(&log, &opts).unwrap();
        assert_eq!(rows, 3);
        assert_eq!(
            fs::read_to_string(&opts.output).unwrap(),
            "step,load,displacement\n1,0.25,3.5\n2,0.5,4.0\n3,0.75,4.5\n"
        );
    }

    #[test]
    fn test_extract_without_header_and_custom_separator() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("beam.log");
        fs::write(&log, "DATA; 1; 2\nDATA; 3; 4\n").unwrap();
        let opts = ExtractOptions {
            marker: Some("DATA;".to_string()),
            separator: ";".to_string(),
            ..options(dir.path())
        };

        assert_eq!(extract_csv_from_log(&log, &opts).unwrap(), 2);
        assert_eq!(fs::read_to_string(&opts.output).unwrap(), "1,2\n3,4\n");
    }

    #[test]
    fn test_missing_marker() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("beam.log");
        fs::write(&log, LOG).unwrap();
        let opts = ExtractOptions {
            marker: None,
            ..options(dir.path())
        };
        let err = extract_csv_from_log(&log, &opts).unwrap_err();
        assert!(matches!(err, MomaError::ConfigurationMissing(_)));
        assert!(err.to_string().contains("No marker"));
    }

    #[test]
    fn test_missing_log_file() {
        let dir = tempdir().unwrap();
        let err = extract_csv_from_log(&dir.path().join("beam.log"), &options(dir.path()))
            .unwrap_err();
        assert!(matches!(err, MomaError::ConfigurationMissing(_)));
        assert!(err.to_string().contains("not found"));
        assert!(!dir.path().join("results.csv").exists());
    }

    #[test]
    fn test_separator_must_be_one_byte() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("beam.log");
        fs::write(&log, LOG).unwrap();
        let opts = ExtractOptions {
            separator: "::".to_string(),
            ..options(dir.path())
        };
        assert!(matches!(
            extract_csv_from_log(&log, &opts),
            Err(MomaError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_ragged_rows_fail() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("beam.log");
        fs::write(&log, "RESULT: 1, 2\nRESULT: 3\n").unwrap();
        let err = extract_csv_from_log(&log, &options(dir.path())).unwrap_err();
        assert!(matches!(err, MomaError::Extract { .. }));
    }
}
