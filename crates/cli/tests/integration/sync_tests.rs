//! Sync scenarios backed by the `/bin/sh` package client in
//! [`crate::common::FAKE_CLIENT_CONFIG`].

#![cfg(unix)]

use predicates::prelude::*;

use crate::common::TestEnv;

fn env_with(deps: &[(&str, &str, &str)]) -> TestEnv {
  let env = TestEnv::new();
  env.write_source(deps);
  env.regenerate();
  env
}

// =============================================================================
// plan
// =============================================================================

mod plan {
  use super::*;

  #[test]
  fn lists_fetches_for_fresh_workspace() {
    let env = env_with(&[("infra/tool", "version:2@1.0.0", "bin"), ("infra/other", "version:1@3", "other")]);

    env
      .depsync_cmd()
      .arg("plan")
      .assert()
      .success()
      .stdout(predicate::str::contains("infra/tool").and(predicate::str::contains("Fetch")));

    assert!(!env.path("bin").exists());
  }

  #[test]
  fn json_output() {
    let env = env_with(&[("infra/tool", "version:2@1.0.0", "bin")]);

    let output = env.depsync_cmd().args(["plan", "-o", "json"]).output().unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["actions"][0]["action"], "fetch");
    assert_eq!(plan["actions"][0]["id"], "infra/tool");
    assert_eq!(plan["actions"][0]["version"], "version:2@1.0.0");
  }

  #[test]
  fn missing_artifact_suggests_regenerate() {
    let env = TestEnv::new();
    env
      .depsync_cmd()
      .arg("plan")
      .assert()
      .failure()
      .stderr(predicate::str::contains("depsync regenerate"));
  }
}

// =============================================================================
// sync
// =============================================================================

mod sync {
  use super::*;

  #[test]
  fn fetches_then_converges() {
    let env = env_with(&[("infra/tool", "version:2@1.0.0", "bin"), ("infra/other", "version:1@3", "other")]);

    env
      .depsync_cmd()
      .arg("sync")
      .assert()
      .success()
      .stdout(predicate::str::contains("Sync complete"));

    assert_eq!(env.read_file("bin/VERSION").trim(), "version:2@1.0.0");
    assert_eq!(env.read_file("other/VERSION").trim(), "version:1@3");

    env
      .depsync_cmd()
      .arg("plan")
      .assert()
      .success()
      .stdout(predicate::str::contains("up to date"));
  }

  #[test]
  fn updates_changed_pin() {
    let env = env_with(&[("infra/tool", "version:2@1.0.0", "bin")]);
    env.depsync_cmd().arg("sync").assert().success();

    env.write_source(&[("infra/tool", "version:2@1.1.0", "bin")]);
    env.regenerate();

    let output = env.depsync_cmd().args(["sync", "-o", "json"]).output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["plan"]["actions"][0]["action"], "update");
    assert_eq!(report["summary"]["outcomes"]["infra/tool"]["outcome"], "updated");
    assert_eq!(env.read_file("bin/VERSION").trim(), "version:2@1.1.0");
  }

  #[test]
  fn failure_is_isolated() {
    let env = env_with(&[
      ("a/tool", "version:1@1", "a"),
      ("b/broken", "version:1@1", "b"),
      ("c/tool", "version:1@1", "c"),
    ]);

    env
      .depsync_cmd()
      .args(["sync", "--jobs", "1"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("b/broken").and(predicate::str::contains("1 of 3")));

    assert!(env.path("a/VERSION").exists());
    assert!(env.path("c/VERSION").exists());
    assert!(!env.path("b/VERSION").exists());

    let output = env.depsync_cmd().args(["plan", "-o", "json"]).output().unwrap();
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let actions = plan["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["id"], "b/broken");
    assert_eq!(plan["unchanged"], serde_json::json!(["a/tool", "c/tool"]));
  }

  #[test]
  fn zero_jobs_is_rejected() {
    let env = env_with(&[("a/tool", "version:1@1", "a")]);
    env
      .depsync_cmd()
      .args(["sync", "--jobs", "0"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("--jobs"));
  }

  #[test]
  fn invalid_timeout_is_rejected() {
    let env = env_with(&[("a/tool", "version:1@1", "a")]);
    env.depsync_cmd().args(["sync", "--timeout", "soon"]).assert().failure();
  }
}

// =============================================================================
// orphans
// =============================================================================

mod orphans {
  use super::*;

  /// Sync `a` and `b`, then drop `b` from the manifest.
  fn orphaned_b() -> TestEnv {
    let env = env_with(&[("a/tool", "version:1@1", "a"), ("b/tool", "version:1@1", "b")]);
    env.depsync_cmd().arg("sync").assert().success();
    assert!(env.path("b/VERSION").exists());

    env.write_source(&[("a/tool", "version:1@1", "a")]);
    env.regenerate();
    env
  }

  #[test]
  fn kept_without_flag() {
    let env = orphaned_b();

    env
      .depsync_cmd()
      .arg("sync")
      .assert()
      .failure()
      .stderr(predicate::str::contains("--remove-orphans"));
    assert!(env.path("b/VERSION").exists());
  }

  #[test]
  fn non_interactive_removal_needs_yes() {
    let env = orphaned_b();

    env
      .depsync_cmd()
      .args(["sync", "--remove-orphans"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("--yes"));
    assert!(env.path("b/VERSION").exists());
  }

  #[test]
  fn removed_with_yes() {
    let env = orphaned_b();

    env
      .depsync_cmd()
      .args(["sync", "--remove-orphans", "--yes"])
      .assert()
      .success()
      .stdout(predicate::str::contains("Removed"));

    assert!(!env.path("b").exists());
    assert!(env.path("a/VERSION").exists());

    env
      .depsync_cmd()
      .arg("plan")
      .assert()
      .success()
      .stdout(predicate::str::contains("up to date"));
  }

  #[test]
  fn moved_checkout_leaves_old_path_until_removed() {
    let env = env_with(&[("a/tool", "version:1@1", "third_party/old")]);
    env.depsync_cmd().arg("sync").assert().success();

    env.write_source(&[("a/tool", "version:1@1", "third_party/new")]);
    env.regenerate();

    env
      .depsync_cmd()
      .arg("plan")
      .assert()
      .success()
      .stdout(predicate::str::contains("third_party/old (moved)"));

    env
      .depsync_cmd()
      .arg("sync")
      .assert()
      .failure()
      .stderr(predicate::str::contains("a/tool (third_party/old)"));
    assert!(env.path("third_party/old/VERSION").exists());
    assert!(env.path("third_party/new/VERSION").exists());

    env
      .depsync_cmd()
      .args(["sync", "--remove-orphans", "--yes"])
      .assert()
      .success();
    assert!(!env.path("third_party/old").exists());

    env
      .depsync_cmd()
      .arg("plan")
      .assert()
      .success()
      .stdout(predicate::str::contains("up to date"));
  }
}

// =============================================================================
// environment
// =============================================================================

mod environment {
  use super::*;
  use assert_cmd::Command;
  use assert_cmd::cargo::cargo_bin_cmd;
  use serial_test::serial;
  use tempfile::TempDir;

  /// Runs `args` from an unrelated directory with only `vars` describing the
  /// workspace.
  fn run_with_env(vars: &[(&str, Option<&str>)], args: &[&str]) -> assert_cmd::assert::Assert {
    let elsewhere = TempDir::new().unwrap();
    let mut vars = vars.to_vec();
    vars.push(("RUST_LOG", None));
    temp_env::with_vars(vars, || {
      let mut cmd: Command = cargo_bin_cmd!("depsync");
      cmd.current_dir(elsewhere.path()).args(args).assert()
    })
  }

  #[test]
  #[serial]
  fn workspace_is_taken_from_env() {
    let env = env_with(&[("infra/tool", "version:2@1.0.0", "bin")]);
    let root = env.root().to_str().unwrap();

    run_with_env(
      &[("DEPSYNC_WORKSPACE", Some(root)), ("DEPSYNC_JOBS", None), ("DEPSYNC_TIMEOUT", None)],
      &["sync"],
    )
    .success();
    assert_eq!(env.read_file("bin/VERSION").trim(), "version:2@1.0.0");
  }

  #[test]
  #[serial]
  fn jobs_from_env_are_validated() {
    let env = env_with(&[("infra/tool", "version:2@1.0.0", "bin")]);
    let root = env.root().to_str().unwrap();

    run_with_env(
      &[("DEPSYNC_WORKSPACE", Some(root)), ("DEPSYNC_JOBS", Some("many")), ("DEPSYNC_TIMEOUT", None)],
      &["sync"],
    )
    .failure()
    .stderr(predicate::str::contains("many"));
    assert!(!env.path("bin").exists());
  }

  #[test]
  #[serial]
  fn timeout_from_env_is_validated() {
    let env = env_with(&[("infra/tool", "version:2@1.0.0", "bin")]);
    let root = env.root().to_str().unwrap();

    run_with_env(
      &[("DEPSYNC_WORKSPACE", Some(root)), ("DEPSYNC_JOBS", None), ("DEPSYNC_TIMEOUT", Some("soon"))],
      &["sync"],
    )
    .failure()
    .stderr(predicate::str::contains("soon"));
  }
}
