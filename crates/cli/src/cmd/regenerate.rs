//! Implementation of the `depsync regenerate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use depsync_lib::regenerate::{RegenerateOptions, RegenerateOutcome, regenerate};

use super::load_workspace;
use crate::output::{print_info, print_stat, print_success, print_warning};

pub struct RegenerateArgs {
  pub source: Option<PathBuf>,
  pub output: Option<PathBuf>,
  pub check: bool,
  pub allow_shared_paths: Vec<String>,
}

/// Execute the regenerate command.
///
/// Relative paths resolve against the workspace root. In check mode nothing is
/// written and a stale artifact is an error.
pub fn cmd_regenerate(workspace_dir: &Path, args: RegenerateArgs) -> Result<()> {
  let (workspace, settings) = load_workspace(workspace_dir)?;

  let mut shared_paths = settings.shared_paths;
  shared_paths.extend(args.allow_shared_paths);

  let options = RegenerateOptions {
    source: workspace.resolve(args.source.as_deref().unwrap_or(settings.source.as_path())),
    artifact: workspace.resolve(args.output.as_deref().unwrap_or(settings.artifact.as_path())),
    check: args.check,
    shared_paths,
  };

  let result = regenerate(&options).context("Regeneration failed")?;

  for collision in &result.collisions {
    print_warning(&format!("{} (allowed)", collision));
  }

  let artifact = options.artifact.display();
  match result.outcome {
    RegenerateOutcome::Written => print_success(&format!("Wrote {}", artifact)),
    RegenerateOutcome::Unchanged => print_info(&format!("{} is up to date", artifact)),
    RegenerateOutcome::Stale => bail!("{} is out of date; run `depsync regenerate`", artifact),
  }
  print_stat("Entries", result.table.len());

  Ok(())
}
