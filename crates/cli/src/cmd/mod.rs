mod plan;
mod regenerate;
mod sync;

use std::path::Path;

use anyhow::{Context, Result};

use depsync_lib::config::Settings;
use depsync_lib::workspace::Workspace;

pub use plan::cmd_plan;
pub use regenerate::{RegenerateArgs, cmd_regenerate};
pub use sync::{SyncArgs, cmd_sync};

/// Open the workspace at `dir` and resolve its settings.
fn load_workspace(dir: &Path) -> Result<(Workspace, Settings)> {
  let workspace = Workspace::open(dir).context("Failed to open workspace")?;
  let settings = Settings::load(&workspace).context("Failed to load settings")?;
  Ok((workspace, settings))
}
