//! Removal of the files a moris run leaves in the project directory.

use glob::{Pattern, glob};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::NEWTON_CSV;
use crate::errors::{MomaError, Result};

const SCRATCH_PATTERNS: [&str; 5] = [
    "xtk_temp.exo",
    "Parameter_Receipt.xml",
    "debug_mesh_*.json",
    "mapping_result_*.json",
    "surface_meshes_*.json",
];

/// Glob patterns, relative to the project directory, that `clean` removes.
///
/// `all` adds build intermediates and convergence history.
pub fn clean_patterns(project: &str, all: bool) -> Vec<String> {
    let project = Pattern::escape(project);
    let mut patterns = vec![
        format!("{}.exo", project),
        format!("{}.log", project),
        format!("{}.so", project),
    ];
    patterns.extend(SCRATCH_PATTERNS.iter().map(|p| p.to_string()));
    if all {
        patterns.push(format!("{}.o", project));
        patterns.push(Pattern::escape(NEWTON_CSV));
        patterns.push("residuals.png".to_string());
    }
    patterns
}

/// Delete every file in `project_dir` matching the clean patterns. Returns
/// the removed paths.
pub fn clean_dir(project_dir: &Path, project: &str, all: bool) -> Result<Vec<PathBuf>> {
    let base = Pattern::escape(&project_dir.to_string_lossy());
    let mut removed = Vec::new();

    for pattern in clean_patterns(project, all) {
        debug!("Looking for files with pattern: {}", pattern);
        let full = format!("{}/{}", base, pattern);
        let entries = glob(&full).map_err(|e| {
            MomaError::ConfigurationMissing(format!("Invalid clean pattern {}: {}", pattern, e))
        })?;
        for path in entries.filter_map(|entry| entry.ok()) {
            if !path.is_file() {
                continue;
            }
            std::fs::remove_file(&path).map_err(|e| MomaError::io(&path, e))?;
            debug!("Removing file: {}", path.display());
            removed.push(path);
        }
    }

    Ok(removed)
}
