//! `moma run`: build the shared object, then run moris on it.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use moma::config::{BuildType, ProjectConfig, RunContext, RunOptions, Toolchain};
use moma::errors::MomaError;
use moma::orchestrator::{Orchestrator, RunOutcome};

use super::clean::remove_generated;

/// Flags of the `run` subcommand.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub processors: u32,
    pub only_shared_object: bool,
    pub run_only: bool,
    pub dbg: bool,
    pub opt: bool,
}

impl RunArgs {
    fn build_type(&self) -> BuildType {
        if self.opt {
            BuildType::Optimized
        } else {
            if !self.dbg {
                warn!("No build type specified, using debug build");
            }
            BuildType::Debug
        }
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            build_type: self.build_type(),
            processors: self.processors,
            shared_object_only: self.only_shared_object,
            run_only: self.run_only,
        }
    }
}

pub async fn cmd_run(project_dir: &Path, args: &RunArgs) -> Result<()> {
    let config = ProjectConfig::load(project_dir)?;
    let options = args.options();
    let toolchain = Toolchain::from_env(options.build_type)?;

    // The shared object from the last build is needed when skipping the build.
    if !options.run_only {
        remove_generated(project_dir, &config.project, false)?;
    }

    let ctx = RunContext::new(project_dir, &config, &options);
    info!(
        project = %ctx.project,
        build = %ctx.build_type,
        root = %toolchain.root.display(),
        "Starting moma run"
    );

    let mut orchestrator = Orchestrator::new(ctx, toolchain);
    match orchestrator.execute().await {
        Ok(RunOutcome::ArtifactOnly) => {
            println!(
                "{} {}",
                console::style("Done:").green().bold(),
                orchestrator.context().artifact.display()
            );
            Ok(())
        }
        Ok(RunOutcome::Completed { iterations }) => {
            println!(
                "{} {} Newton iterations recorded in {}",
                console::style("Done:").green().bold(),
                iterations,
                orchestrator.context().csv_file.display()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(hint) = failure_hint(&e) {
                eprintln!("  {}", console::style(hint).dim());
            }
            Err(e.into())
        }
    }
}

/// Remediation for failures the user can act on.
fn failure_hint(err: &MomaError) -> Option<&'static str> {
    match err {
        MomaError::LockFileDetected { .. } => {
            Some("Remove the stale lock file and restart with `moma run`.")
        }
        MomaError::ArtifactBuildFailed { .. } => {
            Some("Check the compiler output above and the project source.")
        }
        _ => None,
    }
}
