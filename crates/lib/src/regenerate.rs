//! Artifact regeneration.
//!
//! Data flows one way: source manifest -> [`DependencyTable`] -> artifact. The
//! existing artifact is only ever read to compare bytes, so hand edits to it
//! are overwritten (or, with `check`, reported as stale).

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::manifest::{DependencyTable, ManifestError, PathCollision, SourceError, SourceManifest, decode, encode};

#[derive(Debug, Error)]
pub enum RegenerateError {
  #[error(transparent)]
  Source(#[from] SourceError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  /// Entries share a checkout path that was not declared as shared.
  #[error("unacknowledged shared checkout paths:{}", format_collisions(.0))]
  UnacknowledgedCollision(Vec<PathCollision>),

  #[error("failed to read artifact '{path}': {source}")]
  ReadArtifact {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write artifact '{path}': {source}")]
  WriteArtifact {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn format_collisions(collisions: &[PathCollision]) -> String {
  collisions.iter().map(|c| format!("\n  - {}", c)).collect()
}

#[derive(Debug, Clone)]
pub struct RegenerateOptions {
  pub source: PathBuf,
  pub artifact: PathBuf,
  /// Compare only; never write.
  pub check: bool,
  /// Paths that may be shared by more than one entry.
  pub shared_paths: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateOutcome {
  /// The artifact was (re)written.
  Written,
  /// The artifact already had the expected bytes.
  Unchanged,
  /// Check mode: the artifact is missing or differs from the source.
  Stale,
}

#[derive(Debug, Clone)]
pub struct RegenerateResult {
  pub table: DependencyTable,
  /// Acknowledged collisions, for reporting.
  pub collisions: Vec<PathCollision>,
  pub outcome: RegenerateOutcome,
}

/// Rebuild the artifact from the source manifest.
pub fn regenerate(options: &RegenerateOptions) -> Result<RegenerateResult, RegenerateError> {
  let manifest = SourceManifest::load(&options.source)?;
  let decoded = decode(&manifest.deps)?;

  let unacknowledged: Vec<PathCollision> = decoded
    .collisions
    .iter()
    .filter(|c| !options.shared_paths.contains(&c.path))
    .cloned()
    .collect();
  if !unacknowledged.is_empty() {
    return Err(RegenerateError::UnacknowledgedCollision(unacknowledged));
  }

  let text = encode(&decoded.table);
  let current = read_existing(&options.artifact)?;
  let up_to_date = current.as_deref() == Some(text.as_bytes());

  let outcome = match (up_to_date, options.check) {
    (true, _) => RegenerateOutcome::Unchanged,
    (false, true) => RegenerateOutcome::Stale,
    (false, false) => {
      write_atomic(&options.artifact, text.as_bytes())?;
      RegenerateOutcome::Written
    }
  };

  info!(
    entries = decoded.table.len(),
    artifact = %options.artifact.display(),
    ?outcome,
    "regenerated artifact"
  );

  Ok(RegenerateResult {
    table: decoded.table,
    collisions: decoded.collisions,
    outcome,
  })
}

fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, RegenerateError> {
  match fs::read(path) {
    Ok(bytes) => Ok(Some(bytes)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(RegenerateError::ReadArtifact {
      path: path.to_path_buf(),
      source: e,
    }),
  }
}

/// Write via a sibling temp file and rename, so readers never see a partial
/// artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegenerateError> {
  let write_err = |e: io::Error| RegenerateError::WriteArtifact {
    path: path.to_path_buf(),
    source: e,
  };

  let dir = match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  fs::create_dir_all(dir).map_err(write_err)?;

  let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
  file.write_all(bytes).map_err(write_err)?;
  file.as_file().sync_all().map_err(write_err)?;
  file.persist(path).map_err(|e| write_err(e.error))?;

  debug!(path = %path.display(), bytes = bytes.len(), "wrote artifact");
  Ok(())
}
