//! Commit the same branch's worktree in every repository

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FaError, Result};
use crate::git::{DiffStat, GitBackend};
use crate::parallel;
use crate::state::State;
use crate::workspace::Workspace;

use super::select_repos;

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub message: String,
    /// Stage modifications to tracked files first
    pub all: bool,
    pub amend: bool,
    pub dry_run: bool,
    /// Commit even when HEAD is detached
    pub allow_detached: bool,
    /// Restrict to these repositories (empty means all)
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitStatus {
    Committed,
    WouldCommit,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub repo: String,
    pub branch: String,
    pub status: CommitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommitResult {
    fn new(repo: &str, branch: &str, status: CommitStatus) -> Self {
        Self {
            repo: repo.to_string(),
            branch: branch.to_string(),
            status,
            commit_sha: None,
            files_changed: 0,
            insertions: 0,
            deletions: 0,
            error: None,
        }
    }

    fn with_stat(mut self, stat: DiffStat) -> Self {
        self.files_changed = stat.files_changed;
        self.insertions = stat.insertions;
        self.deletions = stat.deletions;
        self
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Repository cleared for the commit step
struct Pending {
    slot: usize,
    path: PathBuf,
    head_before: Option<String>,
    stat: DiffStat,
}

pub struct CommitEngine {
    ws: Workspace,
    git: Arc<dyn GitBackend>,
}

impl CommitEngine {
    pub fn new(ws: Workspace, git: Arc<dyn GitBackend>) -> Self {
        Self { ws, git }
    }

    /// Commit `branch` in every selected repository
    ///
    /// Only an unknown repository name fails the whole call; everything else
    /// is reported per repository.
    pub async fn run(&self, state: &State, branch: &str, opts: &CommitOptions) -> Result<Vec<CommitResult>> {
        debug!(%branch, dry_run = opts.dry_run, all = opts.all, amend = opts.amend, "CommitEngine::run: called");
        let names = select_repos(state, &opts.repos)?;
        let mut slots: Vec<Option<CommitResult>> = vec![None; names.len()];
        let mut pending: HashMap<String, Pending> = HashMap::new();

        // Snapshots are taken sequentially before anything is dispatched
        for (slot, name) in names.iter().enumerate() {
            match self.prepare(state, name, branch, opts).await {
                Ok(Prepared::Done(result)) => slots[slot] = Some(result),
                Ok(Prepared::Ready { path, head_before, stat }) => {
                    pending.insert(
                        name.clone(),
                        Pending {
                            slot,
                            path,
                            head_before,
                            stat,
                        },
                    );
                }
                Err(e) => {
                    slots[slot] =
                        Some(CommitResult::new(name, branch, CommitStatus::Failed).with_error(e.chain_message()))
                }
            }
        }

        let dispatch: Vec<String> = names.iter().filter(|n| pending.contains_key(*n)).cloned().collect();
        debug!(count = dispatch.len(), "CommitEngine::run: dispatching commits");
        let outcomes = parallel::execute(&dispatch, |name| {
            let git = self.git.clone();
            let path = pending[&name].path.clone();
            let message = opts.message.clone();
            let amend = opts.amend;
            async move {
                git.commit(&path, &message, amend).await?;
                Ok(())
            }
        })
        .await;

        for outcome in outcomes {
            let p = &pending[&outcome.item];
            let result = match outcome.result {
                Ok(()) => self.classify(&outcome.item, branch, p).await,
                Err(e) => CommitResult::new(&outcome.item, branch, CommitStatus::Failed)
                    .with_stat(p.stat)
                    .with_error(e.chain_message()),
            };
            slots[p.slot] = Some(result);
        }

        let results: Vec<CommitResult> = slots.into_iter().flatten().collect();
        info!(
            committed = results.iter().filter(|r| r.status == CommitStatus::Committed).count(),
            total = results.len(),
            "Commit finished on branch {}",
            branch
        );
        Ok(results)
    }

    async fn prepare(&self, state: &State, name: &str, branch: &str, opts: &CommitOptions) -> Result<Prepared> {
        let path = self.ws.worktree_path(name, branch);
        let listed = state.get(name).map(|r| r.has_worktree(branch)).unwrap_or(false);
        if !listed || !path.is_dir() {
            debug!(%name, "CommitEngine::prepare: no worktree");
            return Ok(Prepared::Done(
                CommitResult::new(name, branch, CommitStatus::Skipped)
                    .with_error(format!("no worktree for branch '{}'", branch)),
            ));
        }

        if self.git.is_detached(&path).await? && !opts.allow_detached {
            debug!(%name, "CommitEngine::prepare: detached HEAD");
            return Ok(Prepared::Done(
                CommitResult::new(name, branch, CommitStatus::Failed)
                    .with_error("HEAD is detached (use --allow-detached to commit anyway)"),
            ));
        }

        // Dry runs never stage; they count unstaged tracked changes instead
        if opts.all && !opts.dry_run {
            if let Err(e) = self.git.stage_tracked(&path).await {
                warn!("Failed to stage tracked changes in {}: {}", path.display(), e);
            }
        }

        let include_unstaged = opts.all && opts.dry_run;
        let stat = self.git.diff_stat(&path, include_unstaged).await?;
        let has_changes = if include_unstaged {
            !stat.is_empty()
        } else {
            self.git.has_staged_changes(&path).await?
        };

        if !has_changes && !opts.amend {
            debug!(%name, "CommitEngine::prepare: nothing staged");
            return Ok(Prepared::Done(
                CommitResult::new(name, branch, CommitStatus::Skipped).with_error("nothing staged"),
            ));
        }

        if opts.dry_run {
            return Ok(Prepared::Done(
                CommitResult::new(name, branch, CommitStatus::WouldCommit).with_stat(stat),
            ));
        }

        let head_before = self.git.head_sha(&path).await?;
        Ok(Prepared::Ready { path, head_before, stat })
    }

    /// A commit that left HEAD where it was did not commit anything
    async fn classify(&self, name: &str, branch: &str, p: &Pending) -> CommitResult {
        match self.git.head_sha(&p.path).await {
            Ok(after) if after.is_some() && after != p.head_before => {
                CommitResult {
                    commit_sha: after,
                    ..CommitResult::new(name, branch, CommitStatus::Committed).with_stat(p.stat)
                }
            }
            Ok(_) => {
                debug!(%name, "CommitEngine::classify: HEAD unchanged");
                CommitResult::new(name, branch, CommitStatus::Skipped).with_error("nothing to commit")
            }
            Err(e) => CommitResult::new(name, branch, CommitStatus::Failed)
                .with_stat(p.stat)
                .with_error(FaError::from(e).chain_message()),
        }
    }
}

enum Prepared {
    Done(CommitResult),
    Ready {
        path: PathBuf,
        head_before: Option<String>,
        stat: DiffStat,
    },
}
