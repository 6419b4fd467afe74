/// Length of a pinned commit hash (SHA-1, hex encoded).
pub const COMMIT_HASH_LEN: usize = 40;

/// Provenance header written at the top of every generated artifact.
pub const GENERATED_HEADER: [&str; 2] = [
  "# Code generated by depsync regenerate; DO NOT EDIT.",
  "# Source of truth is the source manifest; edits here are overwritten.",
];

pub const DEFAULT_SOURCE_FILENAME: &str = "deps.json";
pub const DEFAULT_ARTIFACT_FILENAME: &str = "DEPS.gen";
pub const CONFIG_FILENAME: &str = "depsync.toml";

/// Directory under the workspace root holding depsync's own bookkeeping.
pub const STATE_DIRNAME: &str = ".depsync";

/// Directory inside a package destination holding per-package install markers.
pub const PACKAGE_MARKER_DIRNAME: &str = ".depsync-packages";
