//! Advisory workspace lock on `.depsync/lock`.
//!
//! `sync` holds the lock exclusively and records itself as the [`LockHolder`]
//! for as long as it runs. `plan` holds it shared, so plans may overlap with
//! each other but never observe a half-applied sync. The holder record is
//! cleared on release; an empty lock file means nobody is syncing.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::Workspace;

pub const LOCK_FILENAME: &str = "lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  /// Read-only observation (`plan`).
  Shared,
  /// Observation followed by checkout changes (`sync`).
  Exclusive,
}

/// The sync currently applying an artifact to the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub started_at_unix: u64,
  pub artifact: PathBuf,
}

impl LockHolder {
  fn current(artifact: &Path) -> Self {
    Self {
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      artifact: artifact.to_path_buf(),
    }
  }

  fn parse(contents: &str) -> Option<Self> {
    if contents.trim().is_empty() {
      return None;
    }
    serde_json::from_str(contents).ok()
  }
}

impl std::fmt::Display for LockHolder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let started = UNIX_EPOCH + Duration::from_secs(self.started_at_unix);
    write!(
      f,
      "depsync sync of '{}' (PID {}, started {})",
      self.artifact.display(),
      self.pid,
      humantime::format_rfc3339_seconds(started)
    )
  }
}

#[derive(Debug, Error)]
pub enum WorkspaceLockError {
  #[error(
    "workspace '{}' is busy: {}\n\
     If no depsync process is running there, delete {}",
    root.display(),
    describe_holder(holder.as_ref()),
    lock_path.display()
  )]
  Busy {
    root: PathBuf,
    holder: Option<LockHolder>,
    lock_path: PathBuf,
  },

  #[error("failed to open workspace lock '{}': {source}", path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock workspace '{}': {source}", root.display())]
  Lock {
    root: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to record lock holder in '{}': {source}", path.display())]
  RecordHolder {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn describe_holder(holder: Option<&LockHolder>) -> String {
  match holder {
    Some(holder) => holder.to_string(),
    None => "another depsync plan or sync is running".to_string(),
  }
}

/// Held for as long as the value lives; released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
  file: File,
  mode: LockMode,
  lock_path: PathBuf,
}

impl WorkspaceLock {
  /// Try to lock the workspace without blocking.
  ///
  /// `artifact` is recorded as what an exclusive holder is applying, so a
  /// blocked sync can say who is in the way.
  pub fn acquire(workspace: &Workspace, mode: LockMode, artifact: &Path) -> Result<Self, WorkspaceLockError> {
    let lock_path = workspace.lock_path();
    let open_error = |source| WorkspaceLockError::Open {
      path: lock_path.clone(),
      source,
    };

    std::fs::create_dir_all(workspace.state_dir()).map_err(open_error)?;
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(open_error)?;

    match try_lock(&file, mode) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        return Err(WorkspaceLockError::Busy {
          root: workspace.root().to_path_buf(),
          holder: read_holder(&lock_path),
          lock_path,
        });
      }
      Err(source) => {
        return Err(WorkspaceLockError::Lock {
          root: workspace.root().to_path_buf(),
          source,
        });
      }
    }

    let lock = WorkspaceLock { file, mode, lock_path };
    if mode == LockMode::Exclusive {
      lock
        .write_holder(&LockHolder::current(artifact))
        .map_err(|source| WorkspaceLockError::RecordHolder {
          path: lock.lock_path.clone(),
          source,
        })?;
    }
    debug!(root = %workspace.root().display(), ?mode, "workspace locked");
    Ok(lock)
  }

  /// The recorded holder, read through the held handle (a second handle would
  /// fail on Windows while the lock is held).
  pub fn holder(&self) -> Option<LockHolder> {
    let mut file = &self.file;
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    LockHolder::parse(&contents)
  }

  pub fn mode(&self) -> LockMode {
    self.mode
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  fn write_holder(&self, holder: &LockHolder) -> io::Result<()> {
    let mut file = &self.file;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    serde_json::to_writer_pretty(&mut file, holder).map_err(io::Error::other)?;
    file.flush()
  }
}

impl Drop for WorkspaceLock {
  fn drop(&mut self) {
    // The flock itself goes away with the handle; only the record needs work.
    if self.mode == LockMode::Exclusive
      && let Err(e) = self.file.set_len(0)
    {
      warn!(path = %self.lock_path.display(), error = %e, "failed to clear lock holder");
    }
    debug!(mode = ?self.mode, "workspace lock released");
  }
}

fn read_holder(lock_path: &Path) -> Option<LockHolder> {
  let contents = std::fs::read_to_string(lock_path).ok()?;
  LockHolder::parse(&contents)
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is plain data and valid when zeroed; the handle is
  // owned by `file` for the duration of the call.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
