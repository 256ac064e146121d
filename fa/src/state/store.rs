//! StateStore - load, mutate and atomically persist the state document

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ErrorCode, FaError, Result};
use crate::workspace::Workspace;

use super::State;

/// Handle on one workspace's state document
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Exclusive advisory lock, released when dropped
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl StateStore {
    pub fn new(ws: &Workspace) -> Self {
        Self {
            path: ws.state_path(),
            lock_path: ws.state_lock_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write an empty document
    pub fn init(&self) -> Result<()> {
        debug!(path = %self.path.display(), "StateStore::init: called");
        self.save(&State::default())
    }

    /// Load the whole document
    ///
    /// A missing file and a malformed file are distinct errors
    /// (`StateNotFound` vs `StateCorrupt`): the first means the workspace was
    /// never initialized, the second is repaired by regenerating state.
    pub fn load(&self) -> Result<State> {
        debug!(path = %self.path.display(), "StateStore::load: called");
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("StateStore::load: state file missing");
                return Err(FaError::new(
                    ErrorCode::StateNotFound,
                    format!("State file not found: {}", self.path.display()),
                )
                .with_remediation("Run 'fa init' to create a workspace, or 'fa doctor --fix' to regenerate state"));
            }
            Err(e) => return Err(FaError::io(format!("Failed to read {}", self.path.display()), e)),
        };

        let state: State = serde_json::from_str(&content).map_err(|e| {
            debug!("StateStore::load: state file malformed");
            FaError::new(
                ErrorCode::StateCorrupt,
                format!("State file is corrupt: {}", self.path.display()),
            )
            .with_remediation("Run 'fa doctor --fix' to regenerate state from config and disk")
            .with_source(e)
        })?;

        debug!(repos = state.repositories.len(), "StateStore::load: loaded");
        Ok(state)
    }

    /// Rewrite the whole document atomically
    pub fn save(&self, state: &State) -> Result<()> {
        debug!(path = %self.path.display(), "StateStore::save: called");
        let _guard = self.lock()?;
        self.write(state)
    }

    /// Acquire the lock, load, mutate, persist
    ///
    /// The closure's error aborts the cycle without writing anything.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut State) -> Result<R>) -> Result<R> {
        debug!(path = %self.path.display(), "StateStore::update: called");
        let _guard = self.lock()?;
        let mut state = self.load()?;
        let out = mutate(&mut state)?;
        self.write(&state)?;
        Ok(out)
    }

    fn lock(&self) -> Result<LockGuard> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| FaError::io(format!("Failed to open {}", self.lock_path.display()), e))?;
        file.lock_exclusive()
            .map_err(|e| FaError::io(format!("Failed to lock {}", self.lock_path.display()), e))?;
        Ok(LockGuard { file })
    }

    fn write(&self, state: &State) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| FaError::new(ErrorCode::StateCorrupt, "Failed to serialize state").with_source(e))?;

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| FaError::io(format!("Failed to create temp file in {}", dir.display()), e))?;
        write_synced(&mut tmp, json.as_bytes()).map_err(|e| FaError::io("Failed to write state", e))?;
        tmp.persist(&self.path)
            .map_err(|e| FaError::io(format!("Failed to replace {}", self.path.display()), e.error))?;

        info!(repos = state.repositories.len(), "Saved state to {}", self.path.display());
        Ok(())
    }
}

fn write_synced(tmp: &mut NamedTempFile, data: &[u8]) -> std::io::Result<()> {
    tmp.write_all(data)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()
}
