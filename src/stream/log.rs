use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::{MomaError, Result};

/// The `<project>.log` file both pumps append raw lines to.
///
/// Each line is written and flushed under one lock, so lines from stdout and
/// stderr interleave but are never split.
#[derive(Debug, Clone)]
pub struct CombinedLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl CombinedLog {
    /// Create (or truncate) the log file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| MomaError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut entry = String::with_capacity(line.len() + 1);
        entry.push_str(line);
        entry.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("combined log lock poisoned"))?;
        file.write_all(entry.as_bytes())?;
        file.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_create_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beam.log");
        fs::write(&path, "old run\n").unwrap();
        let log = CombinedLog::create(&path).unwrap();
        log.write_line("new run").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new run\n");
    }

    #[test]
    fn test_concurrent_writers_never_split_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beam.log");
        let log = CombinedLog::create(&path).unwrap();

        let writers: Vec<_> = ["stdout", "stderr"]
            .into_iter()
            .map(|name| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        log.write_line(&format!("{} line {} {}", name, i, "x".repeat(64)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 400);
        assert!(
            lines
                .iter()
                .all(|l| (l.starts_with("stdout line ") || l.starts_with("stderr line "))
                    && l.ends_with(&"x".repeat(64)))
        );
    }
}
