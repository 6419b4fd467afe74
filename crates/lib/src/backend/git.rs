//! Source-commit checkouts.
//!
//! Each source-commit pin is checked out as its own repository at the entry's
//! path:
//!
//! 1. `git init` the destination if it is not a repository yet
//! 2. skip the network if the commit is already present locally
//! 3. otherwise shallow-fetch exactly the pinned commit from the remote
//! 4. force a detached checkout of the commit
//!
//! Network fetch and worktree checkout go through the `git` client so they can
//! be killed on timeout; local inspection (HEAD, object presence) uses gix.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Backend, FetchError, Revision, run_command};
use crate::entry::DependencyEntry;

/// Remote URL template used when none is configured. `{id}` is replaced by the
/// entry id.
pub const DEFAULT_URL_TEMPLATE: &str = "https://{id}";

#[derive(Debug, Clone)]
pub struct GitBackend {
  url_template: String,
  program: String,
}

impl Default for GitBackend {
  fn default() -> Self {
    Self::new(DEFAULT_URL_TEMPLATE)
  }
}

impl GitBackend {
  pub fn new(url_template: impl Into<String>) -> Self {
    Self {
      url_template: url_template.into(),
      program: "git".to_string(),
    }
  }

  /// Remote URL for an entry id.
  pub fn remote_url(&self, id: &str) -> String {
    self.url_template.replace("{id}", id)
  }

  async fn git(&self, args: &[&str], cwd: &Path) -> Result<String, FetchError> {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    run_command(&self.program, &args, cwd).await
  }
}

impl Backend for GitBackend {
  async fn fetch_and_checkout(&self, entry: &DependencyEntry, destination: &Path) -> Result<Revision, FetchError> {
    let hash = entry
      .version()
      .commit_hash()
      .ok_or_else(|| FetchError::UnsupportedPin {
        backend: "git",
        version: entry.version().to_string(),
      })?
      .to_ascii_lowercase();

    tokio::fs::create_dir_all(destination)
      .await
      .map_err(|e| FetchError::CreateDir(destination.to_path_buf(), e))?;

    if !destination.join(".git").exists() {
      debug!(id = %entry.id(), path = %destination.display(), "initializing repository");
      self.git(&["init", "--quiet"], destination).await?;
    }

    if has_commit(destination.to_path_buf(), hash.clone()).await {
      debug!(id = %entry.id(), rev = %hash, "commit already present, skipping fetch");
    } else {
      let url = self.remote_url(entry.id());
      info!(id = %entry.id(), url = %url, rev = %hash, "fetching commit");
      self
        .git(&["fetch", "--quiet", "--no-tags", "--depth", "1", &url, &hash], destination)
        .await?;
    }

    self
      .git(&["checkout", "--quiet", "--force", "--detach", &hash], destination)
      .await?;

    let head = read_head(destination.to_path_buf()).await?;
    debug!(id = %entry.id(), rev = %head, "checked out");
    Ok(head)
  }

  async fn current_revision(&self, entry: &DependencyEntry, destination: &Path) -> Option<Revision> {
    if !destination.join(".git").exists() {
      return None;
    }
    match read_head(destination.to_path_buf()).await {
      Ok(rev) => Some(rev),
      Err(e) => {
        debug!(id = %entry.id(), error = %e, "no readable checkout");
        None
      }
    }
  }
}

/// Resolve HEAD to a commit hash.
async fn read_head(path: PathBuf) -> Result<String, FetchError> {
  tokio::task::spawn_blocking(move || {
    let repo = gix::open(&path).map_err(|e| FetchError::Open {
      path: path.clone(),
      source: Box::new(e),
    })?;

    let commit = repo.head_commit().map_err(|e| FetchError::ResolveHead(e.to_string()))?;

    Ok(commit.id.to_string())
  })
  .await
  .map_err(|e| FetchError::Task(e.to_string()))?
}

/// Whether `hash` names a commit already in the repository at `path`.
async fn has_commit(path: PathBuf, hash: String) -> bool {
  tokio::task::spawn_blocking(move || {
    let Ok(repo) = gix::open(&path) else {
      return false;
    };
    let spec = format!("{}^{{commit}}", hash);
    repo
      .rev_parse(spec.as_str())
      .ok()
      .and_then(|spec| spec.single())
      .is_some()
  })
  .await
  .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::process::Command;
  use tempfile::TempDir;

  fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
  }

  fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
      .args(["-c", "user.name=depsync", "-c", "user.email=depsync@example.com"])
      .args(["-c", "init.defaultBranch=main", "-c", "commit.gpgsign=false"])
      .args(args)
      .current_dir(cwd)
      .output()
      .unwrap();
    assert!(output.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout).trim().to_string()
  }

  /// Create an upstream repository at `<root>/<id>` and return it.
  fn upstream(root: &Path, id: &str) -> PathBuf {
    let path = root.join(id);
    std::fs::create_dir_all(&path).unwrap();
    git(&path, &["init", "--quiet"]);
    path
  }

  fn commit(repo: &Path, file: &str, content: &str) -> String {
    std::fs::write(repo.join(file), content).unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "--quiet", "-m", content]);
    git(repo, &["rev-parse", "HEAD"])
  }

  fn backend_for(root: &Path) -> GitBackend {
    GitBackend::new(format!("file://{}/{{id}}", root.display()))
  }

  #[test]
  fn remote_url_substitutes_id() {
    let backend = GitBackend::default();
    assert_eq!(
      backend.remote_url("dawn.googlesource.com/dawn"),
      "https://dawn.googlesource.com/dawn"
    );
  }

  #[tokio::test]
  async fn current_revision_of_missing_checkout_is_none() {
    let temp = TempDir::new().unwrap();
    let entry = DependencyEntry::new("host/a", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "a").unwrap();
    let backend = GitBackend::default();
    assert_eq!(backend.current_revision(&entry, &temp.path().join("a")).await, None);
  }

  #[tokio::test]
  async fn rejects_package_pins() {
    let temp = TempDir::new().unwrap();
    let entry = DependencyEntry::new("infra/tool", "version:2@1.0.0", "bin").unwrap();
    let result = GitBackend::default().fetch_and_checkout(&entry, temp.path()).await;
    assert!(matches!(result, Err(FetchError::UnsupportedPin { .. })));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn fetches_then_moves_to_new_pin() {
    if !git_available() {
      return;
    }
    let remotes = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let repo = upstream(remotes.path(), "host/pkg-a");
    let backend = backend_for(remotes.path());
    let dest = workspace.path().join("third_party/a");

    let first = commit(&repo, "README", "one");
    let entry = DependencyEntry::new("host/pkg-a", &first, "third_party/a").unwrap();
    let rev = backend.fetch_and_checkout(&entry, &dest).await.unwrap();
    assert_eq!(rev, first);
    assert_eq!(backend.current_revision(&entry, &dest).await, Some(first.clone()));
    assert_eq!(std::fs::read_to_string(dest.join("README")).unwrap(), "one");

    let second = commit(&repo, "README", "two");
    let entry = DependencyEntry::new("host/pkg-a", &second, "third_party/a").unwrap();
    let rev = backend.fetch_and_checkout(&entry, &dest).await.unwrap();
    assert_eq!(rev, second);
    assert_eq!(std::fs::read_to_string(dest.join("README")).unwrap(), "two");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn uppercase_pin_checks_out_lowercase_head() {
    if !git_available() {
      return;
    }
    let remotes = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let repo = upstream(remotes.path(), "host/pkg-b");
    let hash = commit(&repo, "lib.rs", "fn main() {}");

    let entry = DependencyEntry::new("host/pkg-b", &hash.to_ascii_uppercase(), "b").unwrap();
    let rev = backend_for(remotes.path())
      .fetch_and_checkout(&entry, &workspace.path().join("b"))
      .await
      .unwrap();
    assert_eq!(rev, hash);
    assert_eq!(rev, entry.version().revision());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn unknown_commit_fails() {
    if !git_available() {
      return;
    }
    let remotes = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let repo = upstream(remotes.path(), "host/pkg-c");
    commit(&repo, "f", "x");

    let entry = DependencyEntry::new("host/pkg-c", "0123456789012345678901234567890123456789", "c").unwrap();
    let result = backend_for(remotes.path())
      .fetch_and_checkout(&entry, &workspace.path().join("c"))
      .await;
    assert!(matches!(result, Err(FetchError::CommandFailed { .. })));
  }
}
