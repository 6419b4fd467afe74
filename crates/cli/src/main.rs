use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;
mod prompts;

use cmd::{RegenerateArgs, SyncArgs, cmd_plan, cmd_regenerate, cmd_sync};
use output::{OutputFormat, print_error};

/// depsync - keep pinned dependency checkouts in step with their manifest
#[derive(Parser)]
#[command(name = "depsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Workspace root (default: current directory)
  #[arg(long, global = true, env = "DEPSYNC_WORKSPACE")]
  workspace: Option<PathBuf>,

  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Rebuild the generated artifact from the source manifest
  Regenerate {
    /// Source manifest (default: from depsync.toml, else deps.json)
    #[arg(long)]
    source: Option<PathBuf>,

    /// Artifact to write (default: from depsync.toml, else DEPS.gen)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write nothing; fail if the artifact is out of date
    #[arg(long)]
    check: bool,

    /// Outermost checkout path that several entries may share or nest under (repeatable)
    #[arg(long = "allow-shared-path", value_name = "PATH")]
    allow_shared_paths: Vec<String>,
  },

  /// Show what a sync would do without touching any checkout
  Plan {
    /// Generated artifact (default: from depsync.toml, else DEPS.gen)
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Fetch, update, and optionally remove checkouts to match the artifact
  Sync {
    /// Generated artifact (default: from depsync.toml, else DEPS.gen)
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// Delete checkouts that are no longer in the artifact
    #[arg(long)]
    remove_orphans: bool,

    /// Skip the removal confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Maximum number of concurrent checkouts
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Limit for a single checkout, e.g. `90s` or `10m`
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .compact()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let workspace = match cli.workspace {
    Some(dir) => dir,
    None => std::env::current_dir().context("Failed to determine current directory")?,
  };

  match cli.command {
    Commands::Regenerate {
      source,
      output,
      check,
      allow_shared_paths,
    } => cmd_regenerate(
      &workspace,
      RegenerateArgs {
        source,
        output,
        check,
        allow_shared_paths,
      },
    ),
    Commands::Plan { artifact, output } => cmd_plan(&workspace, artifact, output),
    Commands::Sync {
      artifact,
      remove_orphans,
      yes,
      jobs,
      timeout,
      output,
    } => cmd_sync(
      &workspace,
      SyncArgs {
        artifact,
        remove_orphans,
        yes,
        jobs,
        timeout,
        output,
      },
    ),
  }
}
