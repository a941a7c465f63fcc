//! Typed error hierarchy for moma.
//!
//! `MomaError` covers everything that can fail an invocation. Decode problems
//! on the child's output streams are not failures; they are reported through
//! `StreamDecodeWarning` and the offending line is skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a `moma` invocation.
#[derive(Debug, Error)]
pub enum MomaError {
    #[error("{0}")]
    ConfigurationMissing(String),

    #[error("{0}")]
    EnvironmentMissing(String),

    #[error("Failed to create shared object for {project}:\n{log}")]
    ArtifactBuildFailed { project: String, log: String },

    #[error("{phase} aborted: moris found a stale lock file (see {log_file})")]
    LockFileDetected { phase: Phase, log_file: PathBuf },

    #[error("moris run failed (exit code {exit_code}), see {log_file} for details")]
    RunFailed { exit_code: i32, log_file: PathBuf },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stream} pump failed: {message}")]
    Pump {
        stream: &'static str,
        message: String,
    },

    #[error("Failed to extract table into {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MomaError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The orchestrated phase an error or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Run,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Build => write!(f, "shared object build"),
            Phase::Run => write!(f, "moris run"),
        }
    }
}

/// A line of child output that was not valid UTF-8.
#[derive(Debug, Error)]
#[error("{stream}: dropped undecodable line ({source})")]
pub struct StreamDecodeWarning {
    pub stream: &'static str,
    #[source]
    pub source: std::string::FromUtf8Error,
}

pub type Result<T, E = MomaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_file_detected_names_phase_and_log() {
        let err = MomaError::LockFileDetected {
            phase: Phase::Build,
            log_file: PathBuf::from("/work/beam.log"),
        };
        let msg = err.to_string();
        assert!(msg.contains("shared object build"));
        assert!(msg.contains("/work/beam.log"));
    }

    #[test]
    fn artifact_build_failed_carries_build_log() {
        let err = MomaError::ArtifactBuildFailed {
            project: "beam".into(),
            log: "undefined reference to `foo`".into(),
        };
        match &err {
            MomaError::ArtifactBuildFailed { project, log } => {
                assert_eq!(project, "beam");
                assert!(log.contains("undefined reference"));
            }
            _ => panic!("Expected ArtifactBuildFailed"),
        }
        assert!(err.to_string().contains("undefined reference"));
    }

    #[test]
    fn run_failed_carries_exit_code() {
        let err = MomaError::RunFailed {
            exit_code: 134,
            log_file: PathBuf::from("beam.log"),
        };
        assert!(err.to_string().contains("134"));
    }

    #[test]
    fn io_helper_keeps_source_kind() {
        let err = MomaError::io(
            "newton_iterations.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        match &err {
            MomaError::Io { path, source } => {
                assert_eq!(path, &PathBuf::from("newton_iterations.csv"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io"),
        }
    }

    #[test]
    fn decode_warning_names_stream() {
        let source = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        let warning = StreamDecodeWarning {
            stream: "stdout",
            source,
        };
        assert!(warning.to_string().starts_with("stdout"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&MomaError::ConfigurationMissing("x".into()));
        let warning = StreamDecodeWarning {
            stream: "stderr",
            source: String::from_utf8(vec![0xc3]).unwrap_err(),
        };
        assert_std_error(&warning);
    }
}
