//! The workspace root and depsync's bookkeeping under it.
//!
//! ```text
//! <root>/
//!   .depsync/
//!     checkouts.json   # ledger of what depsync has checked out
//!     lock             # advisory lock held during plan/sync
//!   third_party/...    # entry checkouts
//! ```

pub mod ledger;
pub mod lock;
pub mod observe;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::STATE_DIRNAME;

pub use ledger::{CheckoutLedger, LedgerError, LedgerRecord};
pub use lock::{LockHolder, LockMode, WorkspaceLock, WorkspaceLockError};
pub use observe::{LocalCheckoutState, ObservedCheckout, observe_local_state};

#[derive(Debug, Error)]
pub enum WorkspaceError {
  #[error("workspace root '{0}' does not exist")]
  NotFound(PathBuf),

  #[error("workspace root '{0}' is not a directory")]
  NotADirectory(PathBuf),

  #[error("failed to resolve workspace root '{path}': {source}")]
  Resolve {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// An existing directory that entry paths are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
  root: PathBuf,
}

impl Workspace {
  /// Open an existing workspace root, canonicalizing it.
  pub fn open(root: &Path) -> Result<Self, WorkspaceError> {
    let root = dunce::canonicalize(root).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        WorkspaceError::NotFound(root.to_path_buf())
      } else {
        WorkspaceError::Resolve {
          path: root.to_path_buf(),
          source: e,
        }
      }
    })?;

    if !root.is_dir() {
      return Err(WorkspaceError::NotADirectory(root));
    }

    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Resolve a user-supplied path (absolute, or relative to the root).
  pub fn resolve(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }

  pub fn state_dir(&self) -> PathBuf {
    self.root.join(STATE_DIRNAME)
  }

  pub fn ledger_path(&self) -> PathBuf {
    self.state_dir().join(ledger::LEDGER_FILENAME)
  }

  pub fn lock_path(&self) -> PathBuf {
    self.state_dir().join(lock::LOCK_FILENAME)
  }
}
