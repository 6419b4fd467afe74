//! One sync pass over a workspace.
//!
//! A [`SyncSession`] holds the workspace lock from observation through
//! execution, so the plan a caller inspects (and possibly confirms) is the plan
//! that gets executed:
//!
//! 1. lock the workspace (shared for a dry run, exclusive for a sync)
//! 2. decode the artifact and load the checkout ledger
//! 3. observe local state and compute the plan
//! 4. optionally execute it and rewrite the ledger from the summary

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::execute::{ExecuteConfig, SyncSummary, execute_plan};
use crate::manifest::{DependencyTable, ManifestError, PathCollision, decode_artifact};
use crate::plan::{SyncAction, SyncPlan, compute_plan};
use crate::workspace::{
  CheckoutLedger, LedgerError, LocalCheckoutState, LockMode, Workspace, WorkspaceLock, WorkspaceLockError,
  observe_local_state,
};

#[derive(Debug, Error)]
pub enum SyncError {
  #[error(transparent)]
  Lock(#[from] WorkspaceLockError),

  #[error("artifact '{0}' not found; run `depsync regenerate` first")]
  MissingArtifact(PathBuf),

  #[error("failed to read artifact '{path}': {source}")]
  ReadArtifact {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid artifact: {0}")]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Ledger(#[from] LedgerError),
}

/// Outcome of an executed session.
#[derive(Debug)]
pub struct SyncReport {
  pub plan: SyncPlan,
  pub summary: SyncSummary,
}

pub struct SyncSession<B> {
  workspace: Workspace,
  _lock: WorkspaceLock,
  backend: Arc<B>,
  table: DependencyTable,
  collisions: Vec<PathCollision>,
  ledger: CheckoutLedger,
  observed: LocalCheckoutState,
  plan: SyncPlan,
}

impl<B: Backend> SyncSession<B> {
  /// Lock the workspace, read the artifact, observe, and plan.
  ///
  /// `mode` should be [`LockMode::Exclusive`] if the session will be executed.
  pub async fn open(
    workspace: &Workspace,
    artifact: &Path,
    backend: Arc<B>,
    mode: LockMode,
  ) -> Result<Self, SyncError> {
    let lock = WorkspaceLock::acquire(workspace, mode, artifact)?;

    let text = std::fs::read_to_string(artifact).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        SyncError::MissingArtifact(artifact.to_path_buf())
      } else {
        SyncError::ReadArtifact {
          path: artifact.to_path_buf(),
          source: e,
        }
      }
    })?;
    let decoded = decode_artifact(&text)?;
    let ledger = CheckoutLedger::load(&workspace.ledger_path())?.unwrap_or_default();

    let observed = observe_local_state(workspace.root(), &decoded.table, &ledger, backend.as_ref()).await;
    let plan = compute_plan(&decoded.table, &observed);

    info!(
      entries = decoded.table.len(),
      fetch = plan.count("fetch"),
      update = plan.count("update"),
      remove = plan.count("remove"),
      "planned sync"
    );

    Ok(Self {
      workspace: workspace.clone(),
      _lock: lock,
      backend,
      table: decoded.table,
      collisions: decoded.collisions,
      ledger,
      observed,
      plan,
    })
  }

  pub fn plan(&self) -> &SyncPlan {
    &self.plan
  }

  pub fn table(&self) -> &DependencyTable {
    &self.table
  }

  pub fn collisions(&self) -> &[PathCollision] {
    &self.collisions
  }

  pub fn observed(&self) -> &LocalCheckoutState {
    &self.observed
  }

  /// Execute the plan and persist the updated ledger.
  pub async fn execute(mut self, config: &ExecuteConfig) -> Result<SyncReport, SyncError> {
    let summary = execute_plan(&self.plan, self.workspace.root(), self.backend.clone(), config, None).await;

    update_ledger(&mut self.ledger, &self.table, &self.plan, &summary);
    self.ledger.save(&self.workspace.ledger_path())?;
    debug!(checkouts = self.ledger.checkouts.len(), "saved checkout ledger");

    Ok(SyncReport {
      plan: self.plan,
      summary,
    })
  }
}

/// Bring the ledger in line with what the pass achieved.
///
/// - table entries that are now (or already were) at their pin are recorded
/// - old locations of a relocated entry stay listed until their removal
///   succeeds
/// - successful removals are forgotten
/// - ids that left the table without a removal action are forgotten: their
///   directory is gone or now belongs to another entry
/// - failures keep whatever record they had
fn update_ledger(ledger: &mut CheckoutLedger, table: &DependencyTable, plan: &SyncPlan, summary: &SyncSummary) {
  for entry in table {
    let id = entry.id();
    let left_behind: Vec<String> = plan
      .actions
      .iter()
      .filter(|a| matches!(a, SyncAction::Remove { relocated: true, .. }) && a.id() == id)
      .filter(|a| !summary.succeeded.contains(&a.key()))
      .map(|a| a.path().to_string())
      .collect();

    if summary.succeeded.contains(id) || plan.unchanged.iter().any(|u| u == id) {
      ledger.record(id, entry.path(), &entry.version().to_string());
    }
    ledger.set_superseded(id, left_behind);
  }

  let stale: Vec<String> = ledger
    .iter()
    .filter(|(id, _)| table.get(id).is_none())
    .filter(|(id, _)| match plan.get(id) {
      Some(SyncAction::Remove { .. }) => summary.succeeded.contains(*id),
      _ => true,
    })
    .map(|(id, _)| id.to_string())
    .collect();

  for id in stale {
    ledger.forget(&id);
  }
}
