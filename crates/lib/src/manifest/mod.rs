//! The dependency table and its codecs.
//!
//! - [`codec`] - artifact decode/encode with the determinism contract
//! - [`source`] - loading the resolved source manifest

pub mod codec;
pub mod source;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::entry::{DependencyEntry, EntryError, paths_overlap};

pub use codec::{Decoded, decode, decode_artifact, encode, parse_artifact};
pub use source::{SourceError, SourceManifest};

/// Why a single entry was rejected during decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryProblem {
  #[error(transparent)]
  Invalid(#[from] EntryError),

  #[error("duplicate id (also declared at position {first})")]
  DuplicateId { first: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
  /// One or more entries failed validation. Every offending id is listed.
  #[error("manifest invalid: {}", format_problems(.problems))]
  ManifestInvalid { problems: Vec<(String, EntryProblem)> },

  /// The artifact does not start with the generated-file header.
  #[error("artifact is missing the generated-file header; it was not produced by depsync regenerate")]
  MissingProvenance,

  /// An artifact line is not a well-formed entry record.
  #[error("artifact line {line}: {message}")]
  MalformedLine { line: usize, message: String },
}

impl ManifestError {
  /// Ids of every entry that failed validation.
  pub fn offending_ids(&self) -> Vec<&str> {
    match self {
      ManifestError::ManifestInvalid { problems } => problems.iter().map(|(id, _)| id.as_str()).collect(),
      _ => Vec::new(),
    }
  }
}

fn format_problems(problems: &[(String, EntryProblem)]) -> String {
  problems
    .iter()
    .map(|(id, problem)| format!("\n  - {}: {}", display_id(id), problem))
    .collect()
}

fn display_id(id: &str) -> &str {
  if id.is_empty() { "<empty id>" } else { id }
}

/// Two or more distinct ids whose checkouts overlap.
///
/// `path` is the outermost checkout of the group. Ids checked out strictly
/// inside it have their paths listed in `nested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathCollision {
  pub path: String,
  pub ids: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub nested: Vec<String>,
}

impl fmt::Display for PathCollision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "path '{}' is shared by {}", self.path, self.ids.join(", "))?;
    if !self.nested.is_empty() {
      write!(f, " (nested: {})", self.nested.join(", "))?;
    }
    Ok(())
  }
}

/// Validated entries in canonical order (ascending by id, byte-wise).
///
/// Tables are never edited in place; a new table is built for every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTable {
  entries: Vec<DependencyEntry>,
}

impl DependencyTable {
  /// Build a table from already-validated entries.
  ///
  /// Fails with `ManifestInvalid` if an id appears more than once.
  pub fn from_entries(entries: Vec<DependencyEntry>) -> Result<Self, ManifestError> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut problems = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
      if let Some(&first) = seen.get(entry.id()) {
        problems.push((entry.id().to_string(), EntryProblem::DuplicateId { first }));
      } else {
        seen.insert(entry.id(), index);
      }
    }

    if !problems.is_empty() {
      return Err(ManifestError::ManifestInvalid { problems });
    }

    Ok(Self::sorted(entries))
  }

  fn sorted(mut entries: Vec<DependencyEntry>) -> Self {
    entries.sort_by(|a, b| a.id().as_bytes().cmp(b.id().as_bytes()));
    Self { entries }
  }

  pub fn entries(&self) -> &[DependencyEntry] {
    &self.entries
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DependencyEntry> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, id: &str) -> Option<&DependencyEntry> {
    self
      .entries
      .binary_search_by(|e| e.id().as_bytes().cmp(id.as_bytes()))
      .ok()
      .map(|index| &self.entries[index])
  }

  /// Whether any entry's checkout is `path`, contains it, or lives inside it.
  pub fn overlaps_path(&self, path: &str) -> bool {
    self.entries.iter().any(|e| paths_overlap(e.path(), path))
  }

  /// Groups of ids whose checkouts are the same directory or nested inside
  /// one another, keyed by the outermost path and sorted by it.
  pub fn path_collisions(&self) -> Vec<PathCollision> {
    let mut groups: BTreeMap<&str, Vec<&DependencyEntry>> = BTreeMap::new();
    for entry in &self.entries {
      groups.entry(self.outermost_overlap(entry.path())).or_default().push(entry);
    }

    groups
      .into_iter()
      .filter(|(_, members)| members.len() > 1)
      .map(|(path, members)| {
        let nested: BTreeSet<&str> = members.iter().map(|e| e.path()).filter(|p| *p != path).collect();
        PathCollision {
          path: path.to_string(),
          ids: members.iter().map(|e| e.id().to_string()).collect(),
          nested: nested.into_iter().map(str::to_string).collect(),
        }
      })
      .collect()
  }

  /// Shortest entry path that is `path` or one of its ancestors.
  ///
  /// Ancestors of a path form a chain, so entries that overlap always share
  /// the same outermost path.
  fn outermost_overlap<'a>(&'a self, path: &'a str) -> &'a str {
    self
      .entries
      .iter()
      .map(|e| e.path())
      .filter(|candidate| paths_overlap(candidate, path) && candidate.len() <= path.len())
      .min_by_key(|candidate| candidate.len())
      .unwrap_or(path)
  }
}

impl<'a> IntoIterator for &'a DependencyTable {
  type Item = &'a DependencyEntry;
  type IntoIter = std::slice::Iter<'a, DependencyEntry>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.iter()
  }
}
