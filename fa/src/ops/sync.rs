//! Fetch every bare store in parallel, then pull one branch repository by repository
//!
//! Fetch only touches the bare stores, which nothing else writes to, so it
//! runs through the parallel executor. Pull mutates working trees, one of
//! which may be the directory the user is standing in, so it runs
//! sequentially after every fetch has finished.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, FaError, Result};
use crate::git::GitBackend;
use crate::parallel;
use crate::state::State;
use crate::workspace::Workspace;

use super::select_repos;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Restrict to these repositories (empty means all)
    pub repos: Vec<String>,
    /// Pull `branch` in each repository after fetching
    pub pull: bool,
    pub branch: Option<String>,
    /// Stash local changes around the pull instead of skipping dirty worktrees
    pub stash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStatus {
    Fetched,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub repo: String,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullStatus {
    Pulled,
    Skipped,
    Failed,
    /// Pull failed after stashing; the local changes are still in the stash
    StashRetained,
    /// Pull applied but popping the stash failed; local changes need manual restore
    RestoreFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullResult {
    pub repo: String,
    pub branch: String,
    pub status: PullStatus,
    /// Local changes were stashed before pulling
    pub stashed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullResult {
    fn new(repo: &str, branch: &str, status: PullStatus) -> Self {
        Self {
            repo: repo.to_string(),
            branch: branch.to_string(),
            status,
            stashed: false,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub fetch: Vec<FetchResult>,
    pub pull: Vec<PullResult>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.fetch.iter().any(|f| f.status == FetchStatus::Failed)
            || self
                .pull
                .iter()
                .any(|p| !matches!(p.status, PullStatus::Pulled | PullStatus::Skipped))
    }
}

pub struct SyncEngine {
    ws: Workspace,
    git: Arc<dyn GitBackend>,
}

impl SyncEngine {
    pub fn new(ws: Workspace, git: Arc<dyn GitBackend>) -> Self {
        Self { ws, git }
    }

    pub async fn run(&self, state: &State, opts: &SyncOptions) -> Result<SyncReport> {
        debug!(pull = opts.pull, stash = opts.stash, branch = ?opts.branch, "SyncEngine::run: called");
        let names = select_repos(state, &opts.repos)?;
        let branch = match (opts.pull, opts.branch.as_deref()) {
            (true, None) => {
                return Err(FaError::new(ErrorCode::InvalidArgument, "No branch to pull")
                    .with_remediation("Run from inside a worktree or pass --branch"));
            }
            (_, branch) => branch,
        };

        let fetch = self.fetch_all(&names).await;

        let mut pull = Vec::new();
        if let Some(branch) = branch.filter(|_| opts.pull) {
            for name in &names {
                pull.push(self.pull_one(state, name, branch, opts.stash).await);
            }
        }

        info!(repos = names.len(), pulled = pull.len(), "Sync finished");
        Ok(SyncReport { fetch, pull })
    }

    async fn fetch_all(&self, names: &[String]) -> Vec<FetchResult> {
        let outcomes = parallel::execute(names, |name| {
            let git = self.git.clone();
            let bare = self.ws.bare_repo_path(&name);
            async move {
                git.fetch(&bare).await?;
                Ok(())
            }
        })
        .await;

        outcomes
            .into_iter()
            .map(|o| match o.result {
                Ok(()) => FetchResult {
                    repo: o.item,
                    status: FetchStatus::Fetched,
                    error: None,
                },
                Err(e) => {
                    warn!("Fetch failed for {}: {}", o.item, e);
                    FetchResult {
                        repo: o.item,
                        status: FetchStatus::Failed,
                        error: Some(e.chain_message()),
                    }
                }
            })
            .collect()
    }

    /// Pull one repository's worktree for `branch`
    ///
    /// Missing worktree, detached HEAD and unstashed local changes are skips,
    /// never failures.
    async fn pull_one(&self, state: &State, name: &str, branch: &str, stash: bool) -> PullResult {
        debug!(%name, %branch, stash, "SyncEngine::pull_one: called");
        let path = self.ws.worktree_path(name, branch);
        let listed = state.get(name).map(|r| r.has_worktree(branch)).unwrap_or(false);
        if !listed || !path.is_dir() {
            return PullResult::new(name, branch, PullStatus::Skipped)
                .with_error(format!("no worktree for branch '{}'", branch));
        }

        match self.git.is_detached(&path).await {
            Ok(true) => {
                return PullResult::new(name, branch, PullStatus::Skipped).with_error("HEAD is detached");
            }
            Ok(false) => {}
            Err(e) => {
                return PullResult::new(name, branch, PullStatus::Failed).with_error(FaError::from(e).chain_message());
            }
        }

        let dirty = match self.git.has_uncommitted_changes(&path).await {
            Ok(dirty) => dirty,
            Err(e) => {
                return PullResult::new(name, branch, PullStatus::Failed).with_error(FaError::from(e).chain_message());
            }
        };
        if dirty && !stash {
            return PullResult::new(name, branch, PullStatus::Skipped)
                .with_error("uncommitted changes (use --stash to pull anyway)");
        }

        let stashed = if dirty {
            match self.git.stash(&path).await {
                Ok(created) => created,
                Err(e) => {
                    return PullResult::new(name, branch, PullStatus::Failed)
                        .with_error(format!("failed to stash local changes: {}", FaError::from(e).chain_message()));
                }
            }
        } else {
            false
        };

        if let Err(e) = self.git.pull(&path).await {
            let e = FaError::from(e).chain_message();
            warn!("Pull failed for {}: {}", name, e);
            return if stashed {
                PullResult {
                    stashed,
                    ..PullResult::new(name, branch, PullStatus::StashRetained).with_error(format!(
                        "pull failed, local changes are still stashed (run 'git stash pop'): {}",
                        e
                    ))
                }
            } else {
                PullResult::new(name, branch, PullStatus::Failed).with_error(e)
            };
        }

        if stashed {
            if let Err(e) = self.git.stash_pop(&path).await {
                let e = FaError::from(e).chain_message();
                warn!("Failed to restore stashed changes in {}: {}", name, e);
                return PullResult {
                    stashed,
                    ..PullResult::new(name, branch, PullStatus::RestoreFailed).with_error(format!(
                        "pull succeeded but failed to restore local changes (they remain in 'git stash list'): {}",
                        e
                    ))
                };
            }
        }

        info!("Pulled {} in {}", branch, name);
        PullResult {
            stashed,
            ..PullResult::new(name, branch, PullStatus::Pulled)
        }
    }
}
