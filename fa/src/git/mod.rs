//! Version-control backend
//!
//! The engines only see the [`GitBackend`] trait. [`GitCli`] implements it by
//! shelling out to `git`; tests substitute an in-memory fake.

mod cli;
mod error;
#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

pub use cli::GitCli;
pub use error::{GitError, GitResult};

/// Files/lines summary of a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStat {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffStat {
    pub fn is_empty(&self) -> bool {
        self.files_changed == 0
    }
}

/// Capabilities the engines need from the version-control system
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Clone `url` as a bare store at `dest` with remote-tracking refs configured
    async fn clone_bare(&self, url: &str, dest: &Path) -> GitResult<()>;

    /// Branch the bare store's HEAD points at
    async fn default_branch(&self, bare: &Path) -> GitResult<String>;

    /// Check out an existing branch as a worktree
    async fn worktree_add(&self, bare: &Path, path: &Path, branch: &str) -> GitResult<()>;

    /// Create `branch` from `base` and check it out as a worktree
    async fn worktree_add_new_branch(&self, bare: &Path, path: &Path, branch: &str, base: &str) -> GitResult<()>;

    async fn fetch(&self, bare: &Path) -> GitResult<()>;

    async fn pull(&self, worktree: &Path) -> GitResult<()>;

    /// Push HEAD to `remote_branch` on `remote`
    async fn push(&self, worktree: &Path, remote: &str, remote_branch: &str, set_upstream: bool) -> GitResult<()>;

    async fn commit(&self, worktree: &Path, message: &str, amend: bool) -> GitResult<()>;

    /// Stage modifications to tracked files
    async fn stage_tracked(&self, worktree: &Path) -> GitResult<()>;

    /// Stash local changes; returns whether a stash entry was created
    async fn stash(&self, worktree: &Path) -> GitResult<bool>;

    async fn stash_pop(&self, worktree: &Path) -> GitResult<()>;

    /// Commit id of HEAD, `None` on an unborn branch
    async fn head_sha(&self, worktree: &Path) -> GitResult<Option<String>>;

    async fn is_detached(&self, worktree: &Path) -> GitResult<bool>;

    async fn current_branch(&self, worktree: &Path) -> GitResult<Option<String>>;

    /// Configured upstream of the current branch, e.g. `origin/main`
    async fn upstream(&self, worktree: &Path) -> GitResult<Option<String>>;

    async fn ref_exists(&self, worktree: &Path, reference: &str) -> GitResult<bool>;

    /// Commits reachable from HEAD but not from `base`
    async fn ahead_count(&self, worktree: &Path, base: &str) -> GitResult<usize>;

    async fn has_staged_changes(&self, worktree: &Path) -> GitResult<bool>;

    /// Staged diff, or staged plus unstaged tracked changes when `include_unstaged`
    async fn diff_stat(&self, worktree: &Path, include_unstaged: bool) -> GitResult<DiffStat>;

    /// Any staged, unstaged or untracked change
    async fn has_uncommitted_changes(&self, worktree: &Path) -> GitResult<bool>;
}
