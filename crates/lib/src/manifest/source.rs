//! Source manifest loading.
//!
//! The source manifest is the human-maintained input to regeneration, already
//! resolved into plain triples:
//!
//! ```json
//! {
//!   "deps": [
//!     { "id": "dawn.googlesource.com/dawn", "version": "837abc09...", "path": "third_party/externals/dawn" },
//!     { "id": "infra/3pp/tools/ninja", "version": "version:2@1.12.1.chromium.4", "path": "bin" }
//!   ]
//! }
//! ```
//!
//! Entry order does not matter; the table is sorted on decode.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::RawEntry;

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("failed to read source manifest '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse source manifest '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceManifest {
  pub deps: Vec<RawEntry>,
}

impl SourceManifest {
  pub fn load(path: &Path) -> Result<Self, SourceError> {
    let content = fs::read_to_string(path).map_err(|e| SourceError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    Self::parse(&content).map_err(|e| SourceError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(content)
  }
}
