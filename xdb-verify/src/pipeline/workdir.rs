//! Scoped change of the process working directory.

use crate::errors::VerifyError;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

/// The working directory is process-wide; only one scope may hold it.
static CWD_LOCK: Mutex<()> = Mutex::const_new(());

/// Holds the process working directory at a sub-project root.
///
/// The previous directory is restored when the scope is dropped, on every
/// exit path including an aborted pipeline.
#[derive(Debug)]
pub struct WorkingDirScope {
    previous: PathBuf,
    current: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl WorkingDirScope {
    /// Changes into `dir`, waiting for any other scope to end first.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::WorkingDirectory`] if `dir` cannot be resolved
    /// or entered.
    pub async fn enter(dir: &Path) -> Result<Self, VerifyError> {
        let lock = CWD_LOCK.lock().await;
        let previous = std::env::current_dir()?;
        let current = dir
            .canonicalize()
            .map_err(|source| VerifyError::WorkingDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
        std::env::set_current_dir(&current).map_err(|source| VerifyError::WorkingDirectory {
            path: current.clone(),
            source,
        })?;
        debug!(from = %previous.display(), to = %current.display(), "entered working directory");

        Ok(Self {
            previous,
            current,
            _lock: lock,
        })
    }

    /// The absolute directory this scope entered.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.current
    }
}

impl Drop for WorkingDirScope {
    fn drop(&mut self) {
        if let Err(err) = std::env::set_current_dir(&self.previous) {
            error!(dir = %self.previous.display(), %err, "failed to restore working directory");
        }
    }
}
