//! Types for plan execution.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::backend::FetchError;

/// Errors recorded against a single id during execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The backend failed to fetch or check out the pin.
  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// The backend finished, but the checkout is not at the pinned revision.
  #[error("checked out revision {actual}, expected {expected}")]
  RevisionMismatch { expected: String, actual: String },

  /// Removal was planned but not confirmed.
  #[error("refusing to remove '{path}' (no longer in the table) without confirmation")]
  OrphanRemovalDenied { path: String },

  /// The path recorded for removal is not a safe workspace-relative path.
  #[error("refusing to remove '{path}': {reason}")]
  UnsafeRemoval { path: String, reason: String },

  /// Failed to delete an orphaned checkout.
  #[error("failed to remove '{path}': {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The action did not finish within the configured limit.
  #[error("timed out after {}", format_timeout(.0))]
  Timeout(Duration),

  /// The action's task panicked or was cancelled.
  #[error("task failed: {0}")]
  TaskFailed(String),
}

fn format_timeout(timeout: &Duration) -> String {
  humantime::format_duration(*timeout).to_string()
}

/// What happened to one id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ActionOutcome {
  /// First checkout.
  Fetched { revision: String },
  /// Moved from one revision to another.
  Updated { from: String, to: String },
  /// Orphaned checkout deleted.
  Removed { bytes_freed: u64 },
  /// Already done by an earlier pass; not attempted again.
  Resumed,
}

/// Result of executing a plan.
///
/// Every planned action ends up, under its [`SyncAction::key`], in exactly
/// one of `succeeded` or `failed`.
///
/// [`SyncAction::key`]: crate::plan::SyncAction::key
#[derive(Debug, Default, Serialize)]
pub struct SyncSummary {
  pub succeeded: BTreeSet<String>,

  #[serde(serialize_with = "serialize_failures")]
  pub failed: BTreeMap<String, ExecuteError>,

  /// Details for each succeeded key.
  pub outcomes: BTreeMap<String, ActionOutcome>,
}

impl SyncSummary {
  /// Returns true if no action failed.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }

  pub fn total(&self) -> usize {
    self.succeeded.len() + self.failed.len()
  }

  pub fn record_success(&mut self, key: &str, outcome: ActionOutcome) {
    self.failed.remove(key);
    self.succeeded.insert(key.to_string());
    self.outcomes.insert(key.to_string(), outcome);
  }

  pub fn record_failure(&mut self, key: &str, error: ExecuteError) {
    self.succeeded.remove(key);
    self.outcomes.remove(key);
    self.failed.insert(key.to_string(), error);
  }

  /// Sum of bytes freed by removals.
  pub fn bytes_freed(&self) -> u64 {
    self
      .outcomes
      .values()
      .map(|o| match o {
        ActionOutcome::Removed { bytes_freed } => *bytes_freed,
        _ => 0,
      })
      .sum()
  }
}

fn serialize_failures<S: Serializer>(failed: &BTreeMap<String, ExecuteError>, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.collect_map(failed.iter().map(|(id, e)| (id, e.to_string())))
}

/// Configuration for plan execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of actions running at once.
  pub parallelism: usize,

  /// Limit for a single action.
  pub timeout: Duration,

  /// Whether planned removals may delete directories.
  pub confirm_removal: bool,
}

/// Default per-action timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      timeout: DEFAULT_TIMEOUT,
      confirm_removal: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
pub fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
