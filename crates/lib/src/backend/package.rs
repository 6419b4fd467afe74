//! Package checkouts.
//!
//! Package pins (`version:N@...` and `git_revision:...`) are installed by an
//! external package client. The client command is a template; each argument
//! may contain `{id}`, `{version}` and `{dest}`, substituted per entry.
//!
//! Several packages may install into one directory (e.g. `bin`), so what is
//! installed is tracked per package in a marker file:
//!
//! ```text
//! <dest>/.depsync-packages/<escaped id>   -> contains the version string
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Backend, FetchError, Revision, run_command};
use crate::consts::PACKAGE_MARKER_DIRNAME;
use crate::entry::DependencyEntry;

/// Client command used when none is configured.
pub const DEFAULT_COMMAND: [&str; 6] = ["cipd", "install", "{id}", "{version}", "-root", "{dest}"];

#[derive(Debug, Clone)]
pub struct PackageBackend {
  command: Vec<String>,
}

impl Default for PackageBackend {
  fn default() -> Self {
    Self::new(DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect())
  }
}

impl PackageBackend {
  pub fn new(command: Vec<String>) -> Self {
    Self { command }
  }

  /// The client command for one entry, placeholders substituted.
  pub fn command_for(&self, entry: &DependencyEntry, destination: &Path) -> Vec<String> {
    let version = entry.version().to_string();
    let dest = destination.display().to_string();
    self
      .command
      .iter()
      .map(|arg| {
        arg
          .replace("{id}", entry.id())
          .replace("{version}", &version)
          .replace("{dest}", &dest)
      })
      .collect()
  }
}

impl Backend for PackageBackend {
  async fn fetch_and_checkout(&self, entry: &DependencyEntry, destination: &Path) -> Result<Revision, FetchError> {
    let command = self.command_for(entry, destination);
    let (program, args) = command.split_first().ok_or(FetchError::EmptyCommand)?;

    tokio::fs::create_dir_all(destination)
      .await
      .map_err(|e| FetchError::CreateDir(destination.to_path_buf(), e))?;

    info!(id = %entry.id(), version = %entry.version(), "installing package");
    run_command(program, args, destination).await?;

    let marker = marker_path(destination, entry.id());
    let revision = entry.version().revision();
    if let Some(parent) = marker.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| FetchError::Marker {
          path: marker.clone(),
          source: e,
        })?;
    }
    tokio::fs::write(&marker, &revision)
      .await
      .map_err(|e| FetchError::Marker {
        path: marker.clone(),
        source: e,
      })?;

    debug!(id = %entry.id(), marker = %marker.display(), "recorded install");
    Ok(revision)
  }

  async fn current_revision(&self, entry: &DependencyEntry, destination: &Path) -> Option<Revision> {
    let marker = marker_path(destination, entry.id());
    match tokio::fs::read_to_string(&marker).await {
      Ok(content) => Some(content.trim().to_string()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
      Err(e) => {
        debug!(id = %entry.id(), marker = %marker.display(), error = %e, "unreadable install marker");
        None
      }
    }
  }
}

/// Marker file recording which version of `id` is installed at `destination`.
pub fn marker_path(destination: &Path, id: &str) -> PathBuf {
  destination.join(PACKAGE_MARKER_DIRNAME).join(escape_id(id))
}

/// Encode an id as a single file name.
///
/// `[A-Za-z0-9._-]` pass through; every other byte becomes `%XX`, so distinct
/// ids always map to distinct names.
fn escape_id(id: &str) -> String {
  let mut out = String::with_capacity(id.len());
  for byte in id.bytes() {
    match byte {
      b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(byte as char),
      _ => out.push_str(&format!("%{:02X}", byte)),
    }
  }
  out
}
