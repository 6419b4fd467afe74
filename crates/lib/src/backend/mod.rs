//! Fetch/checkout backends.
//!
//! A [`Backend`] materializes one pinned entry at a destination and reports
//! what is currently there. The executor and the local-state observer only see
//! this trait; which concrete backend handles an entry is decided by
//! [`RoutedBackend`] from the entry's classified version.
//!
//! - [`git`] - source-commit pins, via `git` fetch/checkout and gix inspection
//! - [`package`] - package pins, via a configurable package client command

pub mod git;
pub mod package;

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::entry::DependencyEntry;
use crate::version::FetchStrategy;

pub use git::GitBackend;
pub use package::PackageBackend;

/// Revision string reported by a backend (commit hash or package tag).
pub type Revision = String;

/// Errors reported by a backend while fetching or checking out.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Failed to create the destination directory.
  #[error("failed to create directory '{0}': {1}")]
  CreateDir(PathBuf, #[source] io::Error),

  /// A client process could not be started.
  #[error("failed to run '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  /// A client process exited unsuccessfully.
  #[error("'{command}' failed with exit code {code:?}: {stderr}")]
  CommandFailed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  /// Failed to open the repository at the destination.
  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  /// Failed to resolve HEAD after checkout.
  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),

  /// Failed to read or write the package install marker.
  #[error("failed to record install marker '{path}': {source}")]
  Marker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The package client command template is empty.
  #[error("package client command is empty")]
  EmptyCommand,

  /// The backend was handed a pin it does not know how to fetch.
  #[error("{backend} backend cannot fetch version '{version}'")]
  UnsupportedPin { backend: &'static str, version: String },

  /// A blocking helper task did not complete.
  #[error("background task failed: {0}")]
  Task(String),
}

/// Collaborator contract for materializing pins.
///
/// Both operations receive the entry as well as its destination: package
/// checkouts may share one destination directory, so the destination alone
/// does not identify what is installed there.
pub trait Backend: Send + Sync + 'static {
  /// Fetch the entry's pin and check it out at `destination`, returning the
  /// revision that is now checked out.
  fn fetch_and_checkout(
    &self,
    entry: &DependencyEntry,
    destination: &Path,
  ) -> impl Future<Output = Result<Revision, FetchError>> + Send;

  /// The revision currently checked out for `entry` at `destination`, or
  /// `None` if nothing is there.
  fn current_revision(&self, entry: &DependencyEntry, destination: &Path)
  -> impl Future<Output = Option<Revision>> + Send;
}

/// Dispatches each entry to the backend its version strategy requires.
#[derive(Debug, Clone)]
pub struct RoutedBackend<G = GitBackend, P = PackageBackend> {
  pub git: G,
  pub package: P,
}

impl<G, P> RoutedBackend<G, P> {
  pub fn new(git: G, package: P) -> Self {
    Self { git, package }
  }
}

impl<G: Backend, P: Backend> Backend for RoutedBackend<G, P> {
  async fn fetch_and_checkout(&self, entry: &DependencyEntry, destination: &Path) -> Result<Revision, FetchError> {
    match entry.version().strategy() {
      FetchStrategy::Git => self.git.fetch_and_checkout(entry, destination).await,
      FetchStrategy::Package => self.package.fetch_and_checkout(entry, destination).await,
    }
  }

  async fn current_revision(&self, entry: &DependencyEntry, destination: &Path) -> Option<Revision> {
    match entry.version().strategy() {
      FetchStrategy::Git => self.git.current_revision(entry, destination).await,
      FetchStrategy::Package => self.package.current_revision(entry, destination).await,
    }
  }
}

/// Run a client process to completion, capturing its output.
///
/// The child is killed if the returned future is dropped, so a timed-out
/// action does not leave a process writing into its destination.
pub(crate) async fn run_command(program: &str, args: &[String], cwd: &Path) -> Result<String, FetchError> {
  use tokio::process::Command;
  use tracing::debug;

  let command_line = std::iter::once(program)
    .chain(args.iter().map(String::as_str))
    .collect::<Vec<_>>()
    .join(" ");
  debug!(command = %command_line, cwd = %cwd.display(), "running client command");

  let output = Command::new(program)
    .args(args)
    .current_dir(cwd)
    .env("GIT_TERMINAL_PROMPT", "0")
    .stdin(std::process::Stdio::null())
    .kill_on_drop(true)
    .output()
    .await
    .map_err(|e| FetchError::Spawn {
      program: program.to_string(),
      source: e,
    })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    return Err(FetchError::CommandFailed {
      command: command_line,
      code: output.status.code(),
      stderr,
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
