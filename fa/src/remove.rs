//! Removing a repository from the workspace
//!
//! Guards run first and never leave a trace. After them, each step is
//! recorded on its own so a failure halfway is visible in the result.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{Config, is_safe_name};
use crate::error::{ErrorCode, FaError, Result};
use crate::git::GitBackend;
use crate::ops::unsafe_state_key;
use crate::state::{StateStore, normalize};
use crate::vscode::WorkspaceFile;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Delete worktrees even when they have uncommitted changes
    pub force: bool,
    /// Only edit the config and the workspace file
    pub config_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalResult {
    pub name: String,
    pub removed_from_config: bool,
    /// Worktree folders were dropped from the `.code-workspace` file
    pub workspace_file_updated: bool,
    pub bare_clone_deleted: bool,
    pub worktrees_deleted: usize,
    pub removed_from_state: bool,
    pub config_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemovalResult {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Remove `name` from config, state and disk
///
/// Guards, in order: the repository is in state under a directory-safe
/// name; `cwd` is not inside one of
/// its worktrees; no worktree has uncommitted changes unless `force`. A
/// guard violation is returned as `Err` before anything is touched. With
/// `config_only` the state, the bare clone and the worktrees stay, so only
/// the first guard applies.
pub async fn remove_repo(
    ws: &Workspace,
    git: &dyn GitBackend,
    name: &str,
    opts: RemoveOptions,
    cwd: &Path,
) -> Result<RemovalResult> {
    debug!(%name, force = opts.force, config_only = opts.config_only, "remove_repo: called");
    let store = StateStore::new(ws);
    let state = store.load()?;
    let Some(repo) = state.get(name) else {
        return Err(FaError::repo_not_found(name));
    };
    if !is_safe_name(name) {
        return Err(unsafe_state_key(name));
    }

    if !opts.config_only {
        let cwd = normalize(cwd);
        let targets = repo
            .worktrees
            .iter()
            .map(|b| ws.worktree_path(name, b))
            .chain([ws.repo_worktrees_dir(name), ws.bare_repo_path(name)]);
        for target in targets {
            if target.exists() && cwd.starts_with(normalize(&target)) {
                return Err(FaError::new(
                    ErrorCode::CwdInsideTarget,
                    format!("Current directory is inside {}", target.display()),
                )
                .with_remediation(format!("cd to {} and run the command again", ws.root().display())));
            }
        }

        if !opts.force {
            let mut dirty = Vec::new();
            for branch in &repo.worktrees {
                let path = ws.worktree_path(name, branch);
                if path.is_dir() && git.has_uncommitted_changes(&path).await? {
                    dirty.push(branch.clone());
                }
            }
            if !dirty.is_empty() {
                return Err(FaError::new(
                    ErrorCode::DirtyWorktree,
                    format!("{} has uncommitted changes in: {}", name, dirty.join(", ")),
                )
                .with_remediation("Commit or stash the changes, or pass --force"));
            }
        }
    }

    let mut result = RemovalResult {
        name: name.to_string(),
        config_only: opts.config_only,
        ..Default::default()
    };

    if let Err(e) = remove_from_config(ws, name).map(|removed| result.removed_from_config = removed) {
        result.error = Some(e.chain_message());
        return Ok(result);
    }

    match WorkspaceFile::update(&ws.workspace_file_path(), |file| {
        file.remove_repo(ws, name);
    }) {
        Ok(()) => result.workspace_file_updated = true,
        Err(e) => warn!("Failed to update workspace file: {}", e.chain_message()),
    }

    if opts.config_only {
        info!("Removed {} from config only", name);
        return Ok(result);
    }

    for branch in &repo.worktrees {
        let path = ws.worktree_path(name, branch);
        if !path.exists() {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(&path) {
            result.error = Some(FaError::io(format!("Failed to delete worktree {}", path.display()), e).chain_message());
            return Ok(result);
        }
        result.worktrees_deleted += 1;
    }
    let repo_dir = ws.repo_worktrees_dir(name);
    if repo_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&repo_dir) {
            warn!("Failed to delete {}: {}", repo_dir.display(), e);
        }
    }

    let bare = ws.bare_repo_path(name);
    if bare.exists() {
        if let Err(e) = std::fs::remove_dir_all(&bare) {
            result.error = Some(FaError::io(format!("Failed to delete bare clone {}", bare.display()), e).chain_message());
            return Ok(result);
        }
        result.bare_clone_deleted = true;
    }

    match store.update(|state| Ok(state.remove_repository(name).is_some())) {
        Ok(removed) => result.removed_from_state = removed,
        Err(e) => {
            result.error = Some(e.chain_message());
            return Ok(result);
        }
    }

    info!(
        worktrees = result.worktrees_deleted,
        bare = result.bare_clone_deleted,
        "Removed repository {}",
        name
    );
    Ok(result)
}

fn remove_from_config(ws: &Workspace, name: &str) -> Result<bool> {
    let path = ws.config_path();
    let mut config = Config::load(&path)?;
    if !config.remove_repo(name) {
        debug!(%name, "remove_from_config: not declared");
        return Ok(false);
    }
    config.save(&path)?;
    Ok(true)
}
