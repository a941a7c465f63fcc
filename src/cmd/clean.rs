//! `moma clean`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use moma::clean::clean_dir;
use moma::config::ProjectConfig;

pub fn cmd_clean(project_dir: &Path, all: bool) -> Result<()> {
    let config = ProjectConfig::load(project_dir)?;
    remove_generated(project_dir, &config.project, all)
}

/// Shared with `moma run`, which cleans before building.
pub fn remove_generated(project_dir: &Path, project: &str, all: bool) -> Result<()> {
    let removed = clean_dir(project_dir, project, all)
        .with_context(|| format!("Failed to clean {}", project_dir.display()))?;
    if removed.is_empty() {
        info!("No files to remove");
    } else {
        info!(
            "Removed {} files from {}",
            removed.len(),
            project_dir.display()
        );
    }
    Ok(())
}
