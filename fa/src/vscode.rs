//! `<name>.code-workspace` folder list
//!
//! Only the `folders` array is interpreted. Every other key, and unknown keys
//! inside folder entries, round-trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{ErrorCode, FaError, Result};
use crate::state::State;
use crate::workspace::{REPOS_DIR, WORKTREES_DIR, Workspace};

/// Folder reference of the workspace root entry
pub const ROOT_FOLDER: &str = ".";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    #[serde(default)]
    pub folders: Vec<Folder>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Folder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            extra: Map::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(clean(&self.path), "" | ROOT_FOLDER)
    }
}

/// Strip `./` prefixes and trailing slashes so equivalent references compare equal
fn clean(path: &str) -> &str {
    let mut p = path.trim();
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    let p = p.trim_end_matches('/');
    if p.is_empty() && !path.trim().is_empty() { ROOT_FOLDER } else { p }
}

fn worktree_prefix() -> String {
    format!("{}/{}/", REPOS_DIR, WORKTREES_DIR)
}

impl WorkspaceFile {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "WorkspaceFile::load: called");
        let content = fs::read_to_string(path)
            .map_err(|e| FaError::io(format!("Failed to read workspace file {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| {
            FaError::new(
                ErrorCode::WorkspaceFileInvalid,
                format!("Invalid workspace file {}", path.display()),
            )
            .with_remediation("Fix the JSON by hand or run 'fa doctor --fix' to rebuild it")
            .with_source(e)
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), folders = self.folders.len(), "WorkspaceFile::save: called");
        let mut content = serde_json::to_string_pretty(self).map_err(|e| {
            FaError::new(ErrorCode::WorkspaceFileInvalid, "Failed to serialize workspace file").with_source(e)
        })?;
        content.push('\n');
        fs::write(path, content)
            .map_err(|e| FaError::io(format!("Failed to write workspace file {}", path.display()), e))
    }

    /// Load (or start a rooted file when absent), apply `edit`, save
    pub fn update(path: &Path, edit: impl FnOnce(&mut WorkspaceFile)) -> Result<()> {
        let mut file = if path.exists() {
            Self::load(path)?
        } else {
            let mut file = Self::default();
            file.ensure_root_folder();
            file
        };
        edit(&mut file);
        file.save(path)
    }

    pub fn has_root(&self) -> bool {
        self.folders.iter().any(Folder::is_root)
    }

    /// Put the root entry first if no folder refers to the root yet
    pub fn ensure_root_folder(&mut self) {
        if !self.has_root() {
            self.folders.insert(0, Folder::new(ROOT_FOLDER));
        }
    }

    /// Folder references that point into the worktrees directory
    pub fn worktree_folders(&self) -> Vec<String> {
        let prefix = worktree_prefix();
        self.folders
            .iter()
            .map(|f| clean(&f.path))
            .filter(|p| p.starts_with(&prefix))
            .map(str::to_string)
            .collect()
    }

    /// Append a worktree folder; returns false when it is already listed
    pub fn add_worktree(&mut self, ws: &Workspace, repo: &str, branch: &str) -> bool {
        let path = ws.worktree_folder_ref(repo, branch);
        if self.folders.iter().any(|f| clean(&f.path) == path) {
            return false;
        }
        self.folders.push(Folder {
            name: Some(format!("{} [{}]", repo, branch)),
            ..Folder::new(path)
        });
        true
    }

    /// Drop every folder of one repository's worktrees; returns how many were removed
    pub fn remove_repo(&mut self, ws: &Workspace, repo: &str) -> usize {
        let prefix = format!("{}/", ws.worktree_folder_ref(repo, "").trim_end_matches('/'));
        let before = self.folders.len();
        self.folders.retain(|f| !clean(&f.path).starts_with(&prefix));
        before - self.folders.len()
    }

    /// Replace the worktree folders with the ones `state` records
    ///
    /// Folders outside the worktrees directory are kept as they are. The root
    /// entry is re-inserted first when `keep_root` is set.
    pub fn rebuild_from(&mut self, state: &State, ws: &Workspace, keep_root: bool) {
        debug!(keep_root, "WorkspaceFile::rebuild_from: called");
        let prefix = worktree_prefix();
        self.folders
            .retain(|f| !f.is_root() && !clean(&f.path).starts_with(&prefix));
        for (repo, branch) in state.worktrees() {
            self.add_worktree(ws, &repo, &branch);
        }
        if keep_root {
            self.ensure_root_folder();
        }
    }
}
