//! State document types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::workspace::Workspace;

/// A materialized repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique key, also the directory name
    pub name: String,

    /// Remote location
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,

    /// Branches currently checked out as worktrees, in creation order
    #[serde(default)]
    pub worktrees: Vec<String>,

    pub added_at: DateTime<Utc>,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            default_branch: None,
            worktrees: Vec::new(),
            added_at: Utc::now(),
        }
    }

    /// Bare store location; derived from the workspace, never persisted
    pub fn bare_repo_path(&self, ws: &Workspace) -> PathBuf {
        ws.bare_repo_path(&self.name)
    }

    pub fn worktree_path(&self, ws: &Workspace, branch: &str) -> PathBuf {
        ws.worktree_path(&self.name, branch)
    }

    pub fn has_worktree(&self, branch: &str) -> bool {
        self.worktrees.iter().any(|w| w == branch)
    }
}

/// The whole state document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub repositories: BTreeMap<String, Repository>,

    /// Branch the last worktree command targeted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_branch: Option<String>,
}

impl State {
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.repositories.contains_key(name)
    }

    /// Repository names in key order
    pub fn names(&self) -> Vec<String> {
        self.repositories.keys().cloned().collect()
    }

    pub fn add_repository(&mut self, repo: Repository) {
        debug!(name = %repo.name, "State::add_repository: called");
        self.repositories.insert(repo.name.clone(), repo);
    }

    pub fn remove_repository(&mut self, name: &str) -> Option<Repository> {
        debug!(%name, "State::remove_repository: called");
        self.repositories.remove(name)
    }

    /// Record a worktree; returns false when the repository is unknown
    pub fn add_worktree(&mut self, repo: &str, branch: &str) -> bool {
        match self.repositories.get_mut(repo) {
            Some(r) => {
                if !r.has_worktree(branch) {
                    r.worktrees.push(branch.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_worktree(&mut self, repo: &str, branch: &str) -> bool {
        match self.repositories.get_mut(repo) {
            Some(r) => {
                let before = r.worktrees.len();
                r.worktrees.retain(|w| w != branch);
                before != r.worktrees.len()
            }
            None => false,
        }
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.repositories.values().any(|r| r.url == url)
    }

    /// Every worktree as `(repo, branch)`, ordered by repository then creation
    pub fn worktrees(&self) -> Vec<(String, String)> {
        self.repositories
            .values()
            .flat_map(|r| r.worktrees.iter().map(|b| (r.name.clone(), b.clone())))
            .collect()
    }

    /// Workspace-relative folder references for every worktree
    pub fn worktree_folder_refs(&self, ws: &Workspace) -> Vec<String> {
        self.worktrees()
            .iter()
            .map(|(repo, branch)| ws.worktree_folder_ref(repo, branch))
            .collect()
    }

    /// Find the `(repo, branch)` worktree that contains `path`
    pub fn locate(&self, ws: &Workspace, path: &Path) -> Option<(String, String)> {
        let path = normalize(path);
        self.worktrees().into_iter().find(|(repo, branch)| {
            let wt = normalize(&ws.worktree_path(repo, branch));
            path.starts_with(&wt)
        })
    }
}

/// Canonicalize when the path exists so symlinked temp dirs compare equal
pub(crate) fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
