//! Artifact encoding and decoding.
//!
//! # Artifact Format
//!
//! ```text
//! # Code generated by depsync regenerate; DO NOT EDIT.
//! # Source of truth is the source manifest; edits here are overwritten.
//! {"id":"host/pkg-a","version":"aaaa...","path":"third_party/a"}
//! {"id":"infra/tool","version":"version:2@1.0.0","path":"bin"}
//! ```
//!
//! One compact JSON record per entry, sorted by id, fields always in
//! `id, version, path` order, every line terminated by `\n`. Two encodes of the
//! same table are byte-identical, and re-encoding a decoded artifact reproduces
//! it exactly.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{DependencyTable, EntryProblem, ManifestError, PathCollision};
use crate::consts::GENERATED_HEADER;
use crate::entry::{DependencyEntry, RawEntry};

/// A validated table plus the path collisions found while building it.
///
/// Collisions are warnings: the caller decides whether they are acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
  pub table: DependencyTable,
  pub collisions: Vec<PathCollision>,
}

/// Validate resolved entries into a table.
///
/// All entries are checked before failing, so a single `ManifestInvalid`
/// carries every offending id (in input order).
pub fn decode(raws: &[RawEntry]) -> Result<Decoded, ManifestError> {
  let mut entries = Vec::with_capacity(raws.len());
  let mut problems = Vec::new();
  let mut first_seen: BTreeMap<&str, usize> = BTreeMap::new();

  for (index, raw) in raws.iter().enumerate() {
    if let Some(&first) = first_seen.get(raw.id.as_str()) {
      problems.push((raw.id.clone(), EntryProblem::DuplicateId { first }));
      continue;
    }
    first_seen.insert(raw.id.as_str(), index);

    match DependencyEntry::from_raw(raw) {
      Ok(entry) => entries.push(entry),
      Err(e) => problems.push((raw.id.clone(), EntryProblem::Invalid(e))),
    }
  }

  if !problems.is_empty() {
    debug!(count = problems.len(), "rejecting manifest");
    return Err(ManifestError::ManifestInvalid { problems });
  }

  let table = DependencyTable::from_entries(entries)?;
  let collisions = table.path_collisions();
  for collision in &collisions {
    warn!(path = %collision.path, ids = ?collision.ids, "checkout paths overlap");
  }

  Ok(Decoded { table, collisions })
}

/// Render a table as artifact text.
pub fn encode(table: &DependencyTable) -> String {
  let mut out = String::new();
  for line in GENERATED_HEADER {
    out.push_str(line);
    out.push('\n');
  }
  for entry in table {
    out.push_str(&encode_line(entry));
    out.push('\n');
  }
  out
}

/// Same bytes as `serde_json::to_string(&RawEntry)`, without the fallible API.
fn encode_line(entry: &DependencyEntry) -> String {
  format!(
    "{{\"id\":{},\"version\":{},\"path\":{}}}",
    quote(entry.id()),
    quote(&entry.version().to_string()),
    quote(entry.path())
  )
}

fn quote(s: &str) -> String {
  serde_json::Value::String(s.to_string()).to_string()
}

/// Split artifact text into raw entries.
///
/// The provenance header must be present verbatim; blank lines are ignored.
pub fn parse_artifact(text: &str) -> Result<Vec<RawEntry>, ManifestError> {
  let mut lines = text.lines().enumerate();

  for expected in GENERATED_HEADER {
    match lines.next() {
      Some((_, line)) if line == expected => {}
      _ => return Err(ManifestError::MissingProvenance),
    }
  }

  let mut raws = Vec::new();
  for (index, line) in lines {
    if line.trim().is_empty() {
      continue;
    }
    let raw: RawEntry = serde_json::from_str(line).map_err(|e| ManifestError::MalformedLine {
      line: index + 1,
      message: e.to_string(),
    })?;
    raws.push(raw);
  }

  Ok(raws)
}

/// Parse and validate artifact text.
pub fn decode_artifact(text: &str) -> Result<Decoded, ManifestError> {
  let raws = parse_artifact(text)?;
  decode(&raws)
}
