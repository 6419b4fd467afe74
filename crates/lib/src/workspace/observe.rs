//! Observing what is currently checked out.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use super::CheckoutLedger;
use crate::backend::{Backend, Revision};
use crate::entry::validate_path;
use crate::manifest::DependencyTable;

/// One checkout found in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedCheckout {
  /// Workspace-relative checkout path.
  pub path: String,
  /// Revision the backend reports, or `None` when only the directory is known
  /// (checkouts recorded in the ledger but no longer in the table).
  pub revision: Option<Revision>,
}

/// What is on disk, keyed by id. Ids without a checkout are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalCheckoutState {
  checkouts: BTreeMap<String, ObservedCheckout>,
  /// `(id, path)` of directories an entry still in the table left behind when
  /// its path changed.
  relocated: BTreeSet<(String, String)>,
}

impl LocalCheckoutState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, id: &str, path: &str, revision: Option<&str>) {
    self.checkouts.insert(
      id.to_string(),
      ObservedCheckout {
        path: path.to_string(),
        revision: revision.map(str::to_string),
      },
    );
  }

  pub fn get(&self, id: &str) -> Option<&ObservedCheckout> {
    self.checkouts.get(id)
  }

  pub fn insert_relocated(&mut self, id: &str, path: &str) {
    self.relocated.insert((id.to_string(), path.to_string()));
  }

  pub fn relocated(&self) -> impl Iterator<Item = (&str, &str)> {
    self.relocated.iter().map(|(id, path)| (id.as_str(), path.as_str()))
  }

  /// Revision checked out for `id`, if any.
  pub fn revision(&self, id: &str) -> Option<&str> {
    self.checkouts.get(id).and_then(|c| c.revision.as_deref())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &ObservedCheckout)> {
    self.checkouts.iter().map(|(id, c)| (id.as_str(), c))
  }

  pub fn len(&self) -> usize {
    self.checkouts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.checkouts.is_empty()
  }
}

/// Ask the backend what each table entry has checked out, and add every
/// ledger checkout whose directory still exists but is no longer where the
/// table puts its id: either the id left the table or its path changed.
pub async fn observe_local_state<B: Backend>(
  root: &Path,
  table: &DependencyTable,
  ledger: &CheckoutLedger,
  backend: &B,
) -> LocalCheckoutState {
  let mut state = LocalCheckoutState::new();

  for entry in table {
    let destination = entry.destination(root);
    if let Some(revision) = backend.current_revision(entry, &destination).await {
      debug!(id = %entry.id(), rev = %revision, "observed checkout");
      state.insert(entry.id(), entry.path(), Some(&revision));
    }
  }

  for (id, record) in ledger.iter() {
    let Some(entry) = table.get(id) else {
      if usable_path(root, id, &record.path) {
        debug!(id, path = %record.path, "observed checkout no longer in table");
        state.insert(id, &record.path, None);
      }
      continue;
    };

    let old_paths = std::iter::once(&record.path).chain(&record.superseded);
    for path in old_paths.filter(|p| p.as_str() != entry.path()) {
      if usable_path(root, id, path) {
        debug!(id, path = %path, new_path = %entry.path(), "observed checkout left behind by relocation");
        state.insert_relocated(id, path);
      }
    }
  }

  state
}

/// Whether a ledger path is safe to act on and still exists.
fn usable_path(root: &Path, id: &str, path: &str) -> bool {
  if let Err(e) = validate_path(id, path) {
    warn!(id, error = %e, "ignoring ledger record with unusable path");
    return false;
  }
  root.join(path).exists()
}
