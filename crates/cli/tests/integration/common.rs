//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Package client stand-in: fails for ids containing `broken`, otherwise
/// records the version in `<dest>/VERSION`.
pub const FAKE_CLIENT_CONFIG: &str = r#"
package_command = [
  "/bin/sh", "-c",
  'case "$1" in *broken*) echo "cannot install $1" >&2; exit 1;; esac; echo "$2" > "$3/VERSION"',
  "sh", "{id}", "{version}", "{dest}",
]
"#;

/// Isolated workspace in a temporary directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A workspace whose package client is [`FAKE_CLIENT_CONFIG`].
  pub fn new() -> Self {
    let env = Self::empty();
    env.write_file("depsync.toml", FAKE_CLIENT_CONFIG);
    env
  }

  /// A workspace with no config file.
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  /// Write a file relative to the workspace root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.path(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.path(relative_path))
      .unwrap_or_else(|e| panic!("Failed to read {}: {}", relative_path, e))
  }

  /// Write `deps.json` from `(id, version, path)` triples.
  pub fn write_source(&self, deps: &[(&str, &str, &str)]) {
    let deps: Vec<serde_json::Value> = deps
      .iter()
      .map(|(id, version, path)| serde_json::json!({"id": id, "version": version, "path": path}))
      .collect();
    self.write_file("deps.json", &serde_json::json!({ "deps": deps }).to_string());
  }

  /// A Command for the depsync binary pointed at this workspace.
  pub fn depsync_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("depsync");
    cmd.env("DEPSYNC_WORKSPACE", self.root());
    cmd.env_remove("DEPSYNC_JOBS");
    cmd.env_remove("DEPSYNC_TIMEOUT");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Regenerate the artifact from `deps.json`, asserting success.
  pub fn regenerate(&self) {
    self.depsync_cmd().arg("regenerate").assert().success();
  }
}
