//! Implementation of the `depsync plan` command.
//!
//! Observes the workspace under a shared lock and prints the actions a sync
//! would take. Nothing is fetched, updated, or removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use depsync_lib::plan::{SyncAction, SyncPlan};
use depsync_lib::sync::SyncSession;
use depsync_lib::workspace::LockMode;

use super::load_workspace;
use crate::output::{ARROW, OutputFormat, action_marker, print_info, print_json, print_stat, print_warning, truncate_hash};

pub fn cmd_plan(workspace_dir: &Path, artifact: Option<PathBuf>, output: OutputFormat) -> Result<()> {
  let (workspace, settings) = load_workspace(workspace_dir)?;
  let artifact = workspace.resolve(artifact.as_deref().unwrap_or(settings.artifact.as_path()));
  let backend = Arc::new(settings.backend());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let session = rt
    .block_on(SyncSession::open(&workspace, &artifact, backend, LockMode::Shared))
    .context("Planning failed")?;

  if output.is_json() {
    return print_json(session.plan());
  }

  for collision in session.collisions() {
    print_warning(&collision.to_string());
  }

  print_plan(session.plan());
  Ok(())
}

/// Print one line per action followed by totals.
pub(crate) fn print_plan(plan: &SyncPlan) {
  if plan.is_empty() {
    print_info("Workspace is up to date");
    return;
  }

  println!();
  for action in &plan.actions {
    print_action(action);
  }
  println!();
  print_stat("Fetch", plan.count("fetch"));
  print_stat("Update", plan.count("update"));
  print_stat("Remove", plan.count("remove"));
  print_stat("Unchanged", plan.unchanged.len());
}

fn print_action(action: &SyncAction) {
  let marker = action_marker(action);
  match action {
    SyncAction::Fetch(entry) => println!(
      "  {} {} {} ({})",
      marker,
      entry.id(),
      entry.path().if_supports_color(Stream::Stdout, |s| s.dimmed()),
      entry.version()
    ),
    SyncAction::Update { entry, from, to } => println!(
      "  {} {} {} ({} {} {})",
      marker,
      entry.id(),
      entry.path().if_supports_color(Stream::Stdout, |s| s.dimmed()),
      truncate_hash(from),
      ARROW,
      truncate_hash(to)
    ),
    SyncAction::Remove { id, path, relocated } => println!(
      "  {} {} {}{}",
      marker,
      id,
      path.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      if *relocated { " (moved)" } else { "" }
    ),
  }
}
