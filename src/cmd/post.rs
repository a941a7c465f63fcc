//! `moma post`.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use moma::config::ProjectConfig;
use moma::post::{ExtractOptions, extract_csv_from_log};

pub fn cmd_post_extract(project_dir: &Path, options: ExtractOptions) -> Result<()> {
    let config = ProjectConfig::load(project_dir)?;
    let log_file = project_dir.join(&config.project).with_extension("log");
    let options = ExtractOptions {
        output: project_dir.join(&options.output),
        ..options
    };

    let rows = extract_csv_from_log(&log_file, &options)?;
    info!(
        "Extracted {} rows from {} into {}",
        rows,
        log_file.display(),
        options.output.display()
    );
    Ok(())
}
