//! Plan execution.
//!
//! [`execute_plan`] applies a [`SyncPlan`] through a [`Backend`]:
//! - overlapping-path actions are ordered into waves (see [`dag`])
//! - actions within a wave run concurrently, bounded by `parallelism`
//! - every action is isolated: its failure or timeout is recorded against its
//!   summary key and its siblings carry on
//! - removals only touch disk when confirmed

pub mod dag;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::backend::Backend;
use crate::entry::{DependencyEntry, validate_path};
use crate::plan::{SyncAction, SyncPlan};

pub use dag::ActionDag;
pub use types::{ActionOutcome, DEFAULT_TIMEOUT, ExecuteConfig, ExecuteError, SyncSummary, num_cpus};

/// Execute every action in `plan` against the workspace at `root`.
///
/// Keys already in `prior.succeeded` are not attempted again and are carried
/// over as succeeded, so an interrupted pass can be resumed with its partial
/// summary.
pub async fn execute_plan<B: Backend>(
  plan: &SyncPlan,
  root: &Path,
  backend: Arc<B>,
  config: &ExecuteConfig,
  prior: Option<&SyncSummary>,
) -> SyncSummary {
  info!(actions = plan.actions.len(), "starting sync execution");

  let mut summary = SyncSummary::default();
  let mut pending: Vec<SyncAction> = Vec::new();

  for action in &plan.actions {
    let id = action.id();
    let key = action.key();
    if prior.is_some_and(|p| p.succeeded.contains(&key)) {
      debug!(id, "already synced by an earlier pass");
      summary.record_success(&key, ActionOutcome::Resumed);
      continue;
    }
    if let SyncAction::Remove { path, .. } = action
      && !config.confirm_removal
    {
      warn!(id, path = %path, "removal not confirmed, leaving checkout in place");
      summary.record_failure(&key, ExecuteError::OrphanRemovalDenied { path: path.clone() });
      continue;
    }
    pending.push(action.clone());
  }

  let waves = ActionDag::from_actions(&pending).waves();
  debug!(wave_count = waves.len(), "computed execution waves");

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, actions = wave.len(), "executing wave");

    let mut join_set = JoinSet::new();
    for &index in wave {
      let action = pending[index].clone();
      let backend = backend.clone();
      let semaphore = semaphore.clone();
      let root = root.to_path_buf();
      let timeout = config.timeout;

      join_set.spawn(async move {
        let key = action.key();
        let Ok(_permit) = semaphore.acquire().await else {
          return (key, Err(ExecuteError::TaskFailed("executor shut down".to_string())));
        };

        let result = match tokio::time::timeout(timeout, apply_action(&action, &root, backend.as_ref())).await {
          Ok(result) => result,
          Err(_) => Err(ExecuteError::Timeout(timeout)),
        };
        (key, result)
      });
    }

    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((key, Ok(outcome))) => {
          info!(key = %key, ?outcome, "action succeeded");
          summary.record_success(&key, outcome);
        }
        Ok((key, Err(e))) => {
          error!(key = %key, error = %e, "action failed");
          summary.record_failure(&key, e);
        }
        Err(e) => {
          error!(error = %e, "action task panicked");
        }
      }
    }

    // A panicked task can't report its key; charge every unreported action.
    for &index in wave {
      let key = pending[index].key();
      if !summary.succeeded.contains(&key) && !summary.failed.contains_key(&key) {
        summary.record_failure(&key, ExecuteError::TaskFailed("task panicked".to_string()));
      }
    }
  }

  info!(
    succeeded = summary.succeeded.len(),
    failed = summary.failed.len(),
    "sync execution complete"
  );

  summary
}

async fn apply_action<B: Backend>(action: &SyncAction, root: &Path, backend: &B) -> Result<ActionOutcome, ExecuteError> {
  match action {
    SyncAction::Fetch(entry) => {
      let revision = checkout(entry, root, backend).await?;
      Ok(ActionOutcome::Fetched { revision })
    }
    SyncAction::Update { entry, from, .. } => {
      let to = checkout(entry, root, backend).await?;
      Ok(ActionOutcome::Updated { from: from.clone(), to })
    }
    SyncAction::Remove { path, .. } => {
      let bytes_freed = remove_checkout(root, path).await?;
      Ok(ActionOutcome::Removed { bytes_freed })
    }
  }
}

/// Fetch and check out `entry`, then verify the backend landed on the pin.
async fn checkout<B: Backend>(entry: &DependencyEntry, root: &Path, backend: &B) -> Result<String, ExecuteError> {
  let expected = entry.version().revision();
  let actual = backend.fetch_and_checkout(entry, &entry.destination(root)).await?;

  if actual != expected {
    return Err(ExecuteError::RevisionMismatch { expected, actual });
  }
  Ok(actual)
}

/// Delete an orphaned checkout, returning the bytes it occupied.
async fn remove_checkout(root: &Path, path: &str) -> Result<u64, ExecuteError> {
  validate_path(path, path).map_err(|e| ExecuteError::UnsafeRemoval {
    path: path.to_string(),
    reason: e.to_string(),
  })?;

  let target = root.join(path);
  let bytes = {
    let target = target.clone();
    tokio::task::spawn_blocking(move || directory_size(&target))
      .await
      .map_err(|e| ExecuteError::TaskFailed(e.to_string()))?
  };

  match tokio::fs::remove_dir_all(&target).await {
    Ok(()) => {
      debug!(path = %target.display(), bytes, "removed checkout");
      Ok(bytes)
    }
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
    Err(e) => Err(ExecuteError::Remove { path: target, source: e }),
  }
}

fn directory_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}
