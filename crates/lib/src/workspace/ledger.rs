//! The checkout ledger.
//!
//! Records every checkout depsync has materialized, so an entry dropped from
//! the table can still be found (and offered for removal) on the next sync.
//!
//! # Ledger Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "checkouts": {
//!     "host/pkg-a": { "path": "third_party/a", "version": "aaaa..." },
//!     "infra/tool": { "path": "bin", "version": "version:2@1.0.0", "superseded": ["tools/bin"] }
//!   }
//! }
//! ```
//!
//! `superseded` lists earlier paths of an entry that moved, whose removal has
//! not happened yet. It is omitted when empty.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current ledger format version.
pub const LEDGER_VERSION: u32 = 1;

pub const LEDGER_FILENAME: &str = "checkouts.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLedger {
  pub version: u32,
  pub checkouts: BTreeMap<String, LedgerRecord>,
}

/// One materialized checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
  /// Workspace-relative checkout path.
  pub path: String,
  /// Version string the checkout was synced to.
  pub version: String,
  /// Earlier paths of this id still awaiting removal.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub superseded: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("failed to read checkout ledger '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write checkout ledger '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse checkout ledger '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported checkout ledger version {0}, expected {LEDGER_VERSION}")]
  UnsupportedVersion(u32),
}

impl Default for CheckoutLedger {
  fn default() -> Self {
    Self::new()
  }
}

impl CheckoutLedger {
  pub fn new() -> Self {
    Self {
      version: LEDGER_VERSION,
      checkouts: BTreeMap::new(),
    }
  }

  /// Load the ledger, or `Ok(None)` if it doesn't exist yet.
  pub fn load(path: &Path) -> Result<Option<Self>, LedgerError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => {
        return Err(LedgerError::Read {
          path: path.to_path_buf(),
          source: e,
        });
      }
    };

    let ledger: CheckoutLedger = serde_json::from_str(&content).map_err(|e| LedgerError::Parse {
      path: path.to_path_buf(),
      source: e,
    })?;

    if ledger.version != LEDGER_VERSION {
      return Err(LedgerError::UnsupportedVersion(ledger.version));
    }

    Ok(Some(ledger))
  }

  /// Write the ledger atomically, creating its directory if needed.
  pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
    let write_err = |e: io::Error| LedgerError::Write {
      path: path.to_path_buf(),
      source: e,
    };

    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(write_err)?;

    let content = serde_json::to_string_pretty(self).map_err(|e| write_err(io::Error::other(e)))?;
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(content.as_bytes()).map_err(write_err)?;
    file.write_all(b"\n").map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
  }

  pub fn get(&self, id: &str) -> Option<&LedgerRecord> {
    self.checkouts.get(id)
  }

  /// Record (or overwrite) a materialized checkout.
  pub fn record(&mut self, id: &str, path: &str, version: &str) {
    self.checkouts.insert(
      id.to_string(),
      LedgerRecord {
        path: path.to_string(),
        version: version.to_string(),
        superseded: Vec::new(),
      },
    );
  }

  /// Replace the earlier paths of `id` still awaiting removal. The record's
  /// current path is never listed.
  pub fn set_superseded(&mut self, id: &str, paths: Vec<String>) {
    if let Some(record) = self.checkouts.get_mut(id) {
      record.superseded = paths.into_iter().filter(|p| *p != record.path).collect();
    }
  }

  pub fn forget(&mut self, id: &str) -> Option<LedgerRecord> {
    self.checkouts.remove(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &LedgerRecord)> {
    self.checkouts.iter().map(|(id, record)| (id.as_str(), record))
  }
}
