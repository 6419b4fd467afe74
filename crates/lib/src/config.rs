//! Workspace configuration.
//!
//! Settings come from, in increasing priority:
//! 1. built-in defaults
//! 2. `<workspace>/depsync.toml`
//! 3. `DEPSYNC_JOBS` / `DEPSYNC_TIMEOUT`
//! 4. command-line flags (applied by the caller on the resolved [`Settings`])
//!
//! ```toml
//! source = "deps.json"
//! artifact = "DEPS.gen"
//! parallelism = 8
//! timeout = "10m"
//! git_url_template = "https://{id}"
//! package_command = ["cipd", "install", "{id}", "{version}", "-root", "{dest}"]
//! shared_paths = ["bin"]
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::backend::{GitBackend, PackageBackend, RoutedBackend, git, package};
use crate::consts::{CONFIG_FILENAME, DEFAULT_ARTIFACT_FILENAME, DEFAULT_SOURCE_FILENAME};
use crate::execute::{DEFAULT_TIMEOUT, ExecuteConfig, num_cpus};
use crate::workspace::Workspace;

pub const JOBS_ENV: &str = "DEPSYNC_JOBS";
pub const TIMEOUT_ENV: &str = "DEPSYNC_TIMEOUT";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid timeout '{value}': {source}")]
  InvalidTimeout {
    value: String,
    #[source]
    source: humantime::DurationError,
  },

  #[error("invalid parallelism '{0}': expected a positive integer")]
  InvalidParallelism(String),

  #[error("package_command must not be empty")]
  EmptyPackageCommand,
}

/// The on-disk `depsync.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
  pub source: Option<PathBuf>,
  pub artifact: Option<PathBuf>,
  pub parallelism: Option<usize>,
  pub timeout: Option<String>,
  pub git_url_template: Option<String>,
  pub package_command: Option<Vec<String>>,
  #[serde(default)]
  pub shared_paths: Vec<String>,
}

impl ConfigFile {
  /// Load the config file, or `Ok(None)` if it doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source: e,
        });
      }
    };

    toml::from_str(&content).map(Some).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  /// Source manifest, relative to the workspace root unless absolute.
  pub source: PathBuf,
  /// Generated artifact, relative to the workspace root unless absolute.
  pub artifact: PathBuf,
  pub parallelism: usize,
  pub timeout: Duration,
  pub git_url_template: String,
  pub package_command: Vec<String>,
  /// Checkout paths allowed to be shared by several entries.
  pub shared_paths: BTreeSet<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      source: PathBuf::from(DEFAULT_SOURCE_FILENAME),
      artifact: PathBuf::from(DEFAULT_ARTIFACT_FILENAME),
      parallelism: num_cpus(),
      timeout: DEFAULT_TIMEOUT,
      git_url_template: git::DEFAULT_URL_TEMPLATE.to_string(),
      package_command: package::DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect(),
      shared_paths: BTreeSet::new(),
    }
  }
}

impl Settings {
  /// Resolve settings for `workspace` from its config file and the process
  /// environment.
  pub fn load(workspace: &Workspace) -> Result<Self, ConfigError> {
    let path = workspace.root().join(CONFIG_FILENAME);
    let file = ConfigFile::load(&path)?;
    if file.is_some() {
      debug!(path = %path.display(), "loaded config file");
    }
    Self::resolve(file.unwrap_or_default(), |key| std::env::var(key).ok())
  }

  /// Layer a config file and environment lookups over the defaults.
  pub fn resolve(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let mut settings = Self::default();

    if let Some(source) = file.source {
      settings.source = source;
    }
    if let Some(artifact) = file.artifact {
      settings.artifact = artifact;
    }
    if let Some(parallelism) = file.parallelism {
      settings.parallelism = check_parallelism(parallelism, || parallelism.to_string())?;
    }
    if let Some(timeout) = file.timeout {
      settings.timeout = parse_timeout(&timeout)?;
    }
    if let Some(template) = file.git_url_template {
      settings.git_url_template = template;
    }
    if let Some(command) = file.package_command {
      if command.is_empty() {
        return Err(ConfigError::EmptyPackageCommand);
      }
      settings.package_command = command;
    }
    settings.shared_paths.extend(file.shared_paths);

    if let Some(jobs) = env(JOBS_ENV) {
      let parsed = jobs
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidParallelism(jobs.clone()))?;
      settings.parallelism = check_parallelism(parsed, || jobs.clone())?;
    }
    if let Some(timeout) = env(TIMEOUT_ENV) {
      settings.timeout = parse_timeout(&timeout)?;
    }

    Ok(settings)
  }

  /// Backend routing source commits to git and everything else to the package
  /// client.
  pub fn backend(&self) -> RoutedBackend {
    RoutedBackend::new(
      GitBackend::new(self.git_url_template.clone()),
      PackageBackend::new(self.package_command.clone()),
    )
  }

  pub fn execute_config(&self, confirm_removal: bool) -> ExecuteConfig {
    ExecuteConfig {
      parallelism: self.parallelism,
      timeout: self.timeout,
      confirm_removal,
    }
  }
}

/// Parse a humantime duration such as `90s` or `10m`.
pub fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
  humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidTimeout {
    value: value.to_string(),
    source: e,
  })
}

fn check_parallelism(value: usize, raw: impl FnOnce() -> String) -> Result<usize, ConfigError> {
  if value == 0 {
    return Err(ConfigError::InvalidParallelism(raw()));
  }
  Ok(value)
}
