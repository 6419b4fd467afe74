//! The pinned dependency entry.
//!
//! A [`DependencyEntry`] can only be obtained through validation, so holding one
//! means the id is usable as a key, the path stays inside the workspace, and the
//! version has already been classified.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::{PinnedVersion, VersionError};

/// Errors raised while validating a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
  /// The id or path has the wrong shape.
  #[error("malformed entry '{id}': {reason}")]
  MalformedEntry { id: String, reason: String },

  /// The version matches none of the pin syntaxes.
  #[error(transparent)]
  Version(#[from] VersionError),
}

/// Unvalidated `{id, version, path}` triple, as read from a source manifest or
/// an artifact line.
///
/// Field order here is the field order of every encoded artifact line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEntry {
  pub id: String,
  pub version: String,
  pub path: String,
}

impl RawEntry {
  pub fn new(id: &str, version: &str, path: &str) -> Self {
    Self {
      id: id.to_string(),
      version: version.to_string(),
      path: path.to_string(),
    }
  }
}

/// A validated dependency pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
  id: String,
  version: PinnedVersion,
  path: String,
}

impl DependencyEntry {
  pub fn new(id: &str, version: &str, path: &str) -> Result<Self, EntryError> {
    validate_id(id)?;
    validate_path(id, path)?;
    let version = PinnedVersion::classify(version)?;

    Ok(Self {
      id: id.to_string(),
      version,
      path: path.to_string(),
    })
  }

  pub fn from_raw(raw: &RawEntry) -> Result<Self, EntryError> {
    Self::new(&raw.id, &raw.version, &raw.path)
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn version(&self) -> &PinnedVersion {
    &self.version
  }

  /// Workspace-relative, `/`-separated checkout path.
  pub fn path(&self) -> &str {
    &self.path
  }

  /// Absolute destination of this entry under `workspace_root`.
  pub fn destination(&self, workspace_root: &Path) -> PathBuf {
    workspace_root.join(&self.path)
  }

  pub fn to_raw(&self) -> RawEntry {
    RawEntry {
      id: self.id.clone(),
      version: self.version.to_string(),
      path: self.path.clone(),
    }
  }
}

impl fmt::Display for DependencyEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{} -> {}", self.id, self.version, self.path)
  }
}

fn malformed(id: &str, reason: impl Into<String>) -> EntryError {
  EntryError::MalformedEntry {
    id: id.to_string(),
    reason: reason.into(),
  }
}

fn validate_id(id: &str) -> Result<(), EntryError> {
  if id.is_empty() {
    return Err(malformed(id, "id is empty"));
  }
  if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
    return Err(malformed(id, "id contains whitespace or control characters"));
  }
  Ok(())
}

/// Check that `path` names a directory strictly inside the workspace root.
///
/// Paths are compared as written, so `.` and empty segments are rejected
/// rather than normalized away; two spellings of one directory would
/// otherwise defeat path-collision detection.
pub fn validate_path(id: &str, path: &str) -> Result<(), EntryError> {
  if path.is_empty() {
    return Err(malformed(id, "path is empty"));
  }
  if path.contains('\\') {
    return Err(malformed(id, format!("path '{}' must use '/' separators", path)));
  }
  if path.starts_with('/') || Path::new(path).is_absolute() || has_drive_prefix(path) {
    return Err(malformed(id, format!("path '{}' is absolute", path)));
  }
  for segment in path.split('/') {
    match segment {
      ".." => return Err(malformed(id, format!("path '{}' escapes the workspace root", path))),
      "" | "." => return Err(malformed(id, format!("path '{}' has an empty or '.' segment", path))),
      s if s.chars().any(char::is_control) => {
        return Err(malformed(id, format!("path '{}' contains control characters", path)));
      }
      _ => {}
    }
  }
  Ok(())
}

/// Whether two validated checkout paths are the same directory or one is
/// nested inside the other.
pub fn paths_overlap(a: &str, b: &str) -> bool {
  fn nested(outer: &str, inner: &str) -> bool {
    inner.len() > outer.len() && inner.starts_with(outer) && inner.as_bytes()[outer.len()] == b'/'
  }
  a == b || nested(a, b) || nested(b, a)
}

fn has_drive_prefix(path: &str) -> bool {
  let bytes = path.as_bytes();
  bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
