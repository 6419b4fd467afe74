use predicates::prelude::*;

use crate::common::TestEnv;

const HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn two_entries(env: &TestEnv) {
  env.write_source(&[("infra/tool", "version:2@1.0.0", "bin"), ("host/pkg-a", HASH, "third_party/a")]);
}

#[test]
fn writes_sorted_artifact() {
  let env = TestEnv::empty();
  two_entries(&env);

  env
    .depsync_cmd()
    .arg("regenerate")
    .assert()
    .success()
    .stdout(predicate::str::contains("Wrote"));

  let artifact = env.read_file("DEPS.gen");
  let host = artifact.find("host/pkg-a").unwrap();
  let tool = artifact.find("infra/tool").unwrap();
  assert!(host < tool);
}

#[test]
fn second_run_is_up_to_date() {
  let env = TestEnv::empty();
  two_entries(&env);
  env.regenerate();
  let first = env.read_file("DEPS.gen");

  env
    .depsync_cmd()
    .arg("regenerate")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));
  assert_eq!(env.read_file("DEPS.gen"), first);
}

#[test]
fn check_detects_stale_artifact() {
  let env = TestEnv::empty();
  two_entries(&env);

  env
    .depsync_cmd()
    .args(["regenerate", "--check"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("out of date"));
  assert!(!env.path("DEPS.gen").exists());

  env.regenerate();
  env.depsync_cmd().args(["regenerate", "--check"]).assert().success();

  let edited = env.read_file("DEPS.gen").replace("1.0.0", "1.0.1");
  env.write_file("DEPS.gen", &edited);
  env.depsync_cmd().args(["regenerate", "--check"]).assert().failure();
}

#[test]
fn custom_paths() {
  let env = TestEnv::empty();
  env.write_file(
    "manifests/pins.json",
    &format!(r#"{{"deps": [{{"id": "host/pkg-a", "version": "{}", "path": "a"}}]}}"#, HASH),
  );

  env
    .depsync_cmd()
    .args(["regenerate", "--source", "manifests/pins.json", "--output", "out/PINS"])
    .assert()
    .success();
  assert!(env.read_file("out/PINS").contains("host/pkg-a"));
}

#[test]
fn invalid_entries_are_all_reported() {
  let env = TestEnv::empty();
  env.write_source(&[("good", HASH, "good"), ("bad-version", "main", "a"), ("bad-path", HASH, "../escape")]);

  env
    .depsync_cmd()
    .arg("regenerate")
    .assert()
    .failure()
    .stderr(predicate::str::contains("bad-version").and(predicate::str::contains("bad-path")));
  assert!(!env.path("DEPS.gen").exists());
}

#[test]
fn shared_path_requires_acknowledgement() {
  let env = TestEnv::empty();
  env.write_source(&[
    ("infra/3pp/tools/ninja", "version:2@1.12.1.chromium.4", "bin"),
    ("skia/tools/sk", &format!("git_revision:{}", HASH), "bin"),
  ]);

  env
    .depsync_cmd()
    .arg("regenerate")
    .assert()
    .failure()
    .stderr(predicate::str::contains("bin"));

  env
    .depsync_cmd()
    .args(["regenerate", "--allow-shared-path", "bin"])
    .assert()
    .success()
    .stderr(predicate::str::contains("allowed"));
}

#[test]
fn shared_path_acknowledged_in_config() {
  let env = TestEnv::empty();
  env.write_file("depsync.toml", "shared_paths = [\"bin\"]\n");
  env.write_source(&[("a/tool", "version:1@1", "bin"), ("b/tool", "version:1@2", "bin")]);

  env.regenerate();
}

#[test]
fn missing_source_fails() {
  let env = TestEnv::empty();
  env
    .depsync_cmd()
    .arg("regenerate")
    .assert()
    .failure()
    .stderr(predicate::str::contains("deps.json"));
}
