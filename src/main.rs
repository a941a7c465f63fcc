use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "moma")]
#[command(version, about = "Build and run moris simulation projects")]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory containing moris.json (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the project's shared object and run moris on it
    #[command(group(ArgGroup::new("build").args(["dbg", "opt"])))]
    Run {
        /// Number of MPI processes
        #[arg(short = 'n', long, default_value = "1")]
        processors: u32,

        /// Only build the shared object
        #[arg(short = 's', long = "only-shared-object")]
        only_shared_object: bool,

        /// Skip the build and run the existing shared object
        #[arg(short, long, conflicts_with = "only_shared_object")]
        run_only: bool,

        /// Use the debug build of moris
        #[arg(short, long)]
        dbg: bool,

        /// Use the optimized build of moris
        #[arg(short, long)]
        opt: bool,
    },
    /// Remove generated files from the project directory
    Clean {
        /// Also remove object files and convergence history
        #[arg(short, long)]
        all: bool,
    },
    /// Post-process the results of a finished run
    Post {
        #[command(subcommand)]
        command: PostCommands,
    },
}

#[derive(Subcommand)]
pub enum PostCommands {
    /// Collect marked lines of the moris log into a CSV file
    Extract {
        /// Prefix identifying the lines to extract
        #[arg(short, long)]
        marker: Option<String>,

        /// Column separator used in the log lines
        #[arg(long, default_value = ",")]
        sep: String,

        /// Header row, written as the first line of the output
        #[arg(long)]
        header: Option<String>,

        /// File to write, relative to the project directory
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", console::style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            processors,
            only_shared_object,
            run_only,
            dbg,
            opt,
        } => {
            let args = cmd::RunArgs {
                processors: *processors,
                only_shared_object: *only_shared_object,
                run_only: *run_only,
                dbg: *dbg,
                opt: *opt,
            };
            cmd::cmd_run(&project_dir, &args).await?;
        }
        Commands::Clean { all } => cmd::cmd_clean(&project_dir, *all)?,
        Commands::Post { command } => match command {
            PostCommands::Extract {
                marker,
                sep,
                header,
                output,
            } => {
                let options = moma::post::ExtractOptions {
                    marker: marker.clone(),
                    separator: sep.clone(),
                    header: header.clone(),
                    output: output.clone(),
                };
                cmd::cmd_post_extract(&project_dir, options)?;
            }
        },
    }

    Ok(())
}
