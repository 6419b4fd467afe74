//! Version pin classification.
//!
//! Every `version` string in a manifest falls into exactly one of three pin
//! syntaxes, and the syntax decides which backend materializes the checkout:
//!
//! - `<40 hex>`: a source-control commit, fetched and checked out with git
//! - `git_revision:<40 hex>`: a package instance tagged with the commit it was built from
//! - `version:<n>@<v>`: a package instance addressed by its version tag
//!
//! Classification happens once, when an entry is constructed. Everything
//! downstream matches on [`PinnedVersion`] rather than re-inspecting strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::consts::COMMIT_HASH_LEN;

const TAGGED_REVISION_LABEL: &str = "git_revision";
const TAGGED_REVISION_PREFIX: &str = "git_revision:";
const PACKAGE_VERSION_PREFIX: &str = "version:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
  #[error("unrecognized version format: '{0}'")]
  UnrecognizedVersionFormat(String),
}

/// Which backend is responsible for a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
  Git,
  Package,
}

/// A classified version pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PinnedVersion {
  /// Bare commit hash.
  SourceCommit { hash: String },

  /// Commit hash carried under a tag label (`git_revision:<hash>`).
  TaggedSourceCommit { hash: String, label: String },

  /// Packaged artifact (`version:<generation>@<semver>`).
  ///
  /// `semver` is kept verbatim: package versions such as `1.12.1.chromium.4`
  /// are not strict SemVer.
  PackageVersion { generation: u32, semver: String },
}

impl PinnedVersion {
  /// Classify a version string.
  ///
  /// Prefixes are checked in a fixed order (`git_revision:`, `version:`, then
  /// bare hash). A string with a recognized prefix but a malformed tail is an
  /// error and never falls through to a later rule.
  pub fn classify(input: &str) -> Result<Self, VersionError> {
    let unrecognized = || VersionError::UnrecognizedVersionFormat(input.to_string());

    if let Some(hash) = input.strip_prefix(TAGGED_REVISION_PREFIX) {
      if !is_commit_hash(hash) {
        return Err(unrecognized());
      }
      return Ok(PinnedVersion::TaggedSourceCommit {
        hash: hash.to_string(),
        label: TAGGED_REVISION_LABEL.to_string(),
      });
    }

    if let Some(rest) = input.strip_prefix(PACKAGE_VERSION_PREFIX) {
      let (generation, semver) = rest.split_once('@').ok_or_else(unrecognized)?;
      if generation.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
        return Err(unrecognized());
      }
      // Leading zeros would not survive re-rendering from the parsed number.
      if generation.len() > 1 && generation.starts_with('0') {
        return Err(unrecognized());
      }
      let generation = generation.parse::<u32>().map_err(|_| unrecognized())?;
      if !is_package_version(semver) {
        return Err(unrecognized());
      }
      return Ok(PinnedVersion::PackageVersion {
        generation,
        semver: semver.to_string(),
      });
    }

    if is_commit_hash(input) {
      return Ok(PinnedVersion::SourceCommit {
        hash: input.to_string(),
      });
    }

    Err(unrecognized())
  }

  pub fn strategy(&self) -> FetchStrategy {
    match self {
      PinnedVersion::SourceCommit { .. } => FetchStrategy::Git,
      PinnedVersion::TaggedSourceCommit { .. } | PinnedVersion::PackageVersion { .. } => FetchStrategy::Package,
    }
  }

  /// The revision a backend reports for a correct checkout of this pin.
  ///
  /// Git reports commit ids in lowercase hex; packages report the tag they
  /// were installed by.
  pub fn revision(&self) -> String {
    match self {
      PinnedVersion::SourceCommit { hash } => hash.to_ascii_lowercase(),
      other => other.to_string(),
    }
  }

  pub fn commit_hash(&self) -> Option<&str> {
    match self {
      PinnedVersion::SourceCommit { hash } | PinnedVersion::TaggedSourceCommit { hash, .. } => Some(hash),
      PinnedVersion::PackageVersion { .. } => None,
    }
  }
}

impl fmt::Display for PinnedVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PinnedVersion::SourceCommit { hash } => write!(f, "{}", hash),
      PinnedVersion::TaggedSourceCommit { hash, label } => write!(f, "{}:{}", label, hash),
      PinnedVersion::PackageVersion { generation, semver } => {
        write!(f, "{}{}@{}", PACKAGE_VERSION_PREFIX, generation, semver)
      }
    }
  }
}

impl FromStr for PinnedVersion {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::classify(s)
  }
}

impl Serialize for PinnedVersion {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for PinnedVersion {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Self::classify(&raw).map_err(serde::de::Error::custom)
  }
}

fn is_commit_hash(s: &str) -> bool {
  s.len() == COMMIT_HASH_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_package_version(s: &str) -> bool {
  !s.is_empty()
    && s
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'_' | b'-'))
}
