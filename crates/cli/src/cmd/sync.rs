//! Implementation of the `depsync sync` command.
//!
//! Plans under an exclusive workspace lock, asks before deleting orphaned
//! checkouts, then executes the plan while still holding the lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use depsync_lib::execute::{ActionOutcome, SyncSummary};
use depsync_lib::plan::SyncPlan;
use depsync_lib::sync::SyncSession;
use depsync_lib::workspace::LockMode;

use super::load_workspace;
use super::plan::print_plan;
use crate::output::{
  OutputFormat, format_bytes, format_duration, print_error, print_json, print_stat, print_success, print_warning,
};
use crate::prompts::confirm;

pub struct SyncArgs {
  pub artifact: Option<PathBuf>,
  pub remove_orphans: bool,
  pub yes: bool,
  pub jobs: Option<usize>,
  pub timeout: Option<Duration>,
  pub output: OutputFormat,
}

#[derive(Serialize)]
struct SyncOutput<'a> {
  plan: &'a SyncPlan,
  summary: &'a SyncSummary,
}

/// Execute the sync command.
///
/// Exits with an error if any planned action failed, including removals that
/// were not confirmed.
pub fn cmd_sync(workspace_dir: &Path, args: SyncArgs) -> Result<()> {
  let start = Instant::now();
  let (workspace, mut settings) = load_workspace(workspace_dir)?;

  if let Some(jobs) = args.jobs {
    if jobs == 0 {
      bail!("--jobs must be at least 1");
    }
    settings.parallelism = jobs;
  }
  if let Some(timeout) = args.timeout {
    settings.timeout = timeout;
  }

  let artifact = workspace.resolve(args.artifact.as_deref().unwrap_or(settings.artifact.as_path()));
  let backend = Arc::new(settings.backend());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let session = rt
    .block_on(SyncSession::open(&workspace, &artifact, backend, LockMode::Exclusive))
    .context("Planning failed")?;

  if !args.output.is_json() {
    for collision in session.collisions() {
      print_warning(&collision.to_string());
    }
    print_plan(session.plan());
  }

  let removals = session.plan().removals().count();
  let confirm_removal = if removals == 0 {
    false
  } else if args.remove_orphans {
    confirm(&format!("Remove {} orphaned checkout(s)?", removals), args.yes)?
  } else {
    if !args.output.is_json() {
      print_warning(&format!(
        "{} orphaned checkout(s) kept; pass --remove-orphans to delete them",
        removals
      ));
    }
    false
  };
  debug!(removals, confirm_removal, "removal confirmation");

  let config = settings.execute_config(confirm_removal);
  let report = rt.block_on(session.execute(&config)).context("Sync failed")?;
  let summary = &report.summary;

  if args.output.is_json() {
    print_json(&SyncOutput {
      plan: &report.plan,
      summary,
    })?;
  } else {
    print_summary(summary, report.plan.unchanged.len(), start.elapsed());
  }

  if !summary.is_success() {
    bail!("{} of {} action(s) failed", summary.failed.len(), summary.total());
  }
  Ok(())
}

fn print_summary(summary: &SyncSummary, unchanged: usize, elapsed: Duration) {
  let (mut fetched, mut updated, mut removed) = (0, 0, 0);
  for outcome in summary.outcomes.values() {
    match outcome {
      ActionOutcome::Fetched { .. } => fetched += 1,
      ActionOutcome::Updated { .. } => updated += 1,
      ActionOutcome::Removed { .. } => removed += 1,
      ActionOutcome::Resumed => {}
    }
  }

  println!();
  for (id, error) in &summary.failed {
    print_error(&format!("{}: {}", id, error));
  }
  if summary.is_success() {
    print_success("Sync complete!");
  }
  print_stat("Fetched", fetched);
  print_stat("Updated", updated);
  print_stat("Removed", removed);
  print_stat("Unchanged", unchanged);
  print_stat("Failed", summary.failed.len());
  if removed > 0 {
    print_stat("Space freed", format_bytes(summary.bytes_freed()));
  }
  print_stat("Duration", format_duration(elapsed));
}
