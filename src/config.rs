use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::errors::{MomaError, Result};

/// Name of the per-project configuration file.
pub const PROJECT_FILE: &str = "moris.json";

/// File the convergence history is written to, relative to the project dir.
pub const NEWTON_CSV: &str = "newton_iterations.csv";

/// Contents of `moris.json`. Only the keys the runner needs are modelled;
/// unknown keys are ignored.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub project: String,
}

#[derive(Deserialize)]
struct ProjectFile {
    #[serde(default)]
    project: Option<String>,
}

impl ProjectConfig {
    /// Load `moris.json` from `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(PROJECT_FILE);
        let content = std::fs::read_to_string(&path).map_err(|_| {
            MomaError::ConfigurationMissing(format!("No {} file found", PROJECT_FILE))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: ProjectFile = serde_json::from_str(content).map_err(|e| {
            MomaError::ConfigurationMissing(format!("{} is not valid: {}", PROJECT_FILE, e))
        })?;
        match file.project {
            Some(name) if !name.trim().is_empty() => Ok(Self {
                project: name.trim().to_string(),
            }),
            _ => Err(MomaError::ConfigurationMissing(format!(
                "No project name found in {}",
                PROJECT_FILE
            ))),
        }
    }
}

/// Which moris build tree to compile against and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    #[default]
    Debug,
    Optimized,
}

impl BuildType {
    /// Environment variable naming the build directory below `MORISROOT`.
    pub fn env_var(&self) -> &'static str {
        match self {
            BuildType::Debug => "MORISBUILDDBG",
            BuildType::Optimized => "MORISBUILDOPT",
        }
    }
}

impl std::fmt::Display for BuildType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildType::Debug => write!(f, "dbg"),
            BuildType::Optimized => write!(f, "opt"),
        }
    }
}

/// Paths into the moris installation, resolved from the environment.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub root: PathBuf,
    pub build_dir: String,
}

impl Toolchain {
    pub fn from_env(build_type: BuildType) -> Result<Self> {
        Self::resolve(build_type, |key| std::env::var(key).ok())
    }

    /// Resolve the toolchain through `lookup` instead of the process
    /// environment.
    pub fn resolve(build_type: BuildType, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let root = lookup("MORISROOT").ok_or_else(|| {
            MomaError::EnvironmentMissing("Environment variable MORISROOT not set".to_string())
        })?;
        let root = std::path::absolute(&root).unwrap_or_else(|_| PathBuf::from(&root));
        if !root.is_dir() {
            return Err(MomaError::EnvironmentMissing(format!(
                "Directory {} not found but set as MORISROOT",
                root.display()
            )));
        }

        let var = build_type.env_var();
        let build_dir = lookup(var).ok_or_else(|| {
            MomaError::EnvironmentMissing(format!("Environment variable {} not set", var))
        })?;

        Ok(Self { root, build_dir })
    }

    pub fn shared_object_script(&self) -> PathBuf {
        self.root
            .join("share")
            .join("scripts")
            .join("create_shared_object.sh")
    }

    pub fn moris_binary(&self) -> PathBuf {
        self.root
            .join(&self.build_dir)
            .join("projects")
            .join("mains")
            .join("moris")
    }
}

/// Options taken from the `run` command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub build_type: BuildType,
    pub processors: u32,
    pub shared_object_only: bool,
    pub run_only: bool,
}

/// Everything one invocation of `moma run` needs to know. Immutable once
/// built.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub project_dir: PathBuf,
    pub project: String,
    pub build_type: BuildType,
    pub processors: u32,
    pub source_file: PathBuf,
    pub artifact: PathBuf,
    pub log_file: PathBuf,
    pub csv_file: PathBuf,
    pub shared_object_only: bool,
    pub run_only: bool,
}

impl RunContext {
    pub fn new(project_dir: &Path, config: &ProjectConfig, options: &RunOptions) -> Self {
        let base = project_dir.join(&config.project);
        Self {
            project_dir: project_dir.to_path_buf(),
            project: config.project.clone(),
            build_type: options.build_type,
            processors: options.processors.max(1),
            source_file: base.with_extension("cpp"),
            artifact: base.with_extension("so"),
            log_file: base.with_extension("log"),
            csv_file: project_dir.join(NEWTON_CSV),
            shared_object_only: options.shared_object_only,
            run_only: options.run_only,
        }
    }

    /// Object file the build script leaves next to the shared object.
    pub fn object_file(&self) -> PathBuf {
        self.artifact.with_extension("o")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_project_name() {
        let config = ProjectConfig::parse(r#"{"project": "beam", "parameters": {"E": 1}}"#).unwrap();
        assert_eq!(config.project, "beam");
    }

    #[test]
    fn test_parse_missing_project_is_configuration_missing() {
        let err = ProjectConfig::parse(r#"{"result_directory": "results"}"#).unwrap_err();
        assert!(matches!(err, MomaError::ConfigurationMissing(_)));
        assert!(err.to_string().contains("No project name"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, MomaError::ConfigurationMissing(_)));
        assert!(err.to_string().contains("moris.json"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_FILE), r#"{"project": "plate"}"#).unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.project, "plate");
    }

    #[test]
    fn test_toolchain_requires_root() {
        let err = Toolchain::resolve(BuildType::Debug, |_| None).unwrap_err();
        assert!(matches!(err, MomaError::EnvironmentMissing(_)));
        assert!(err.to_string().contains("MORISROOT"));
    }

    #[test]
    fn test_toolchain_root_must_exist() {
        let err = Toolchain::resolve(BuildType::Debug, |key| match key {
            "MORISROOT" => Some("/definitely/not/a/moris/root".to_string()),
            _ => Some("build_dbg".to_string()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("not found but set as MORISROOT"));
    }

    #[test]
    fn test_toolchain_picks_build_dir_for_type() {
        let dir = tempdir().unwrap();
        let env: HashMap<&str, String> = HashMap::from([
            ("MORISROOT", dir.path().display().to_string()),
            ("MORISBUILDDBG", "build_dbg".to_string()),
            ("MORISBUILDOPT", "build_opt".to_string()),
        ]);
        let lookup = |key: &str| env.get(key).cloned();

        let opt = Toolchain::resolve(BuildType::Optimized, lookup).unwrap();
        assert_eq!(opt.build_dir, "build_opt");
        assert!(
            opt.moris_binary()
                .ends_with("build_opt/projects/mains/moris")
        );
        assert!(
            opt.shared_object_script()
                .ends_with("share/scripts/create_shared_object.sh")
        );

        let dbg = Toolchain::resolve(BuildType::Debug, lookup).unwrap();
        assert_eq!(dbg.build_dir, "build_dbg");
    }

    #[test]
    fn test_toolchain_missing_build_dir_var() {
        let dir = tempdir().unwrap();
        let root = dir.path().display().to_string();
        let err = Toolchain::resolve(BuildType::Optimized, |key| {
            (key == "MORISROOT").then(|| root.clone())
        })
        .unwrap_err();
        assert!(err.to_string().contains("MORISBUILDOPT"));
    }

    #[test]
    fn test_run_context_paths() {
        let config = ProjectConfig {
            project: "beam".to_string(),
        };
        let options = RunOptions {
            processors: 0,
            ..Default::default()
        };
        let ctx = RunContext::new(Path::new("/work"), &config, &options);
        assert_eq!(ctx.source_file, PathBuf::from("/work/beam.cpp"));
        assert_eq!(ctx.artifact, PathBuf::from("/work/beam.so"));
        assert_eq!(ctx.object_file(), PathBuf::from("/work/beam.o"));
        assert_eq!(ctx.log_file, PathBuf::from("/work/beam.log"));
        assert_eq!(ctx.csv_file, PathBuf::from("/work/newton_iterations.csv"));
        assert_eq!(ctx.processors, 1);
        assert_eq!(ctx.build_type, BuildType::Debug);
    }
}
