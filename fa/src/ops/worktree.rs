//! Create the same branch as a worktree in every repository

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::git::GitBackend;
use crate::parallel;
use crate::state::{State, StateStore};
use crate::vscode::WorkspaceFile;
use crate::workspace::Workspace;

use super::select_repos;

#[derive(Debug, Clone, Default)]
pub struct WorktreeOptions {
    pub branch: String,
    /// Base for a new branch; defaults to each repository's default branch
    pub from: Option<String>,
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorktreeStatus {
    Created,
    Exists,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeResult {
    pub repo: String,
    pub branch: String,
    pub status: WorktreeStatus,
    /// Start point when a new branch was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorktreeResult {
    fn new(repo: &str, branch: &str, status: WorktreeStatus) -> Self {
        Self {
            repo: repo.to_string(),
            branch: branch.to_string(),
            status,
            base: None,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// How a repository gets its worktree
#[derive(Debug, Clone)]
enum Plan {
    /// Branch already exists locally or on origin
    Checkout,
    NewBranch { base: String },
}

enum Planned {
    Done(WorktreeResult),
    Ready { bare: PathBuf, path: PathBuf, plan: Plan },
}

struct Pending {
    slot: usize,
    bare: PathBuf,
    path: PathBuf,
    plan: Plan,
}

pub struct WorktreeEngine {
    ws: Workspace,
    git: Arc<dyn GitBackend>,
}

impl WorktreeEngine {
    pub fn new(ws: Workspace, git: Arc<dyn GitBackend>) -> Self {
        Self { ws, git }
    }

    /// Create `opts.branch` in every selected repository and record it
    ///
    /// The branch becomes the state's current branch when at least one
    /// repository has it checked out afterwards.
    pub async fn run(&self, state: &State, opts: &WorktreeOptions) -> Result<Vec<WorktreeResult>> {
        debug!(branch = %opts.branch, from = ?opts.from, "WorktreeEngine::run: called");
        let names = select_repos(state, &opts.repos)?;
        let branch = opts.branch.as_str();
        let mut slots: Vec<Option<WorktreeResult>> = vec![None; names.len()];
        let mut pending: HashMap<String, Pending> = HashMap::new();

        for (slot, name) in names.iter().enumerate() {
            match self.plan(state, name, branch, opts.from.as_deref()).await {
                Ok(Planned::Ready { bare, path, plan }) => {
                    pending.insert(name.clone(), Pending { slot, bare, path, plan });
                }
                Ok(Planned::Done(done)) => slots[slot] = Some(done),
                Err(e) => {
                    slots[slot] =
                        Some(WorktreeResult::new(name, branch, WorktreeStatus::Failed).with_error(e.chain_message()))
                }
            }
        }

        let dispatch: Vec<String> = names.iter().filter(|n| pending.contains_key(*n)).cloned().collect();
        let outcomes = parallel::execute(&dispatch, |name| {
            let git = self.git.clone();
            let p = &pending[&name];
            let (bare, path, plan) = (p.bare.clone(), p.path.clone(), p.plan.clone());
            let branch = branch.to_string();
            async move {
                match plan {
                    Plan::Checkout => git.worktree_add(&bare, &path, &branch).await?,
                    Plan::NewBranch { base } => git.worktree_add_new_branch(&bare, &path, &branch, &base).await?,
                }
                Ok(())
            }
        })
        .await;

        let mut created = Vec::new();
        for outcome in outcomes {
            let p = &pending[&outcome.item];
            let mut result = match outcome.result {
                Ok(()) => {
                    created.push(outcome.item.clone());
                    WorktreeResult::new(&outcome.item, branch, WorktreeStatus::Created)
                }
                Err(e) => {
                    warn!("Worktree creation failed for {}: {}", outcome.item, e);
                    WorktreeResult::new(&outcome.item, branch, WorktreeStatus::Failed).with_error(e.chain_message())
                }
            };
            if let Plan::NewBranch { base } = &p.plan {
                result.base = Some(base.clone());
            }
            slots[p.slot] = Some(result);
        }

        let results: Vec<WorktreeResult> = slots.into_iter().flatten().collect();
        let checked_out = results.iter().any(|r| r.status != WorktreeStatus::Failed);
        self.record(&created, branch, checked_out)?;

        info!(created = created.len(), total = results.len(), "Worktree {} created", branch);
        Ok(results)
    }

    /// Decide how to create the worktree, or finish early with a result
    async fn plan(
        &self,
        state: &State,
        name: &str,
        branch: &str,
        from: Option<&str>,
    ) -> Result<Planned> {
        let path = self.ws.worktree_path(name, branch);
        let listed = state.get(name).map(|r| r.has_worktree(branch)).unwrap_or(false);
        if path.exists() {
            return Ok(Planned::Done(if listed {
                WorktreeResult::new(name, branch, WorktreeStatus::Exists)
            } else {
                WorktreeResult::new(name, branch, WorktreeStatus::Failed)
                    .with_error(format!("{} exists but is not a recorded worktree", path.display()))
            }));
        }

        let bare = self.ws.bare_repo_path(name);
        if !bare.is_dir() {
            return Ok(Planned::Done(WorktreeResult::new(name, branch, WorktreeStatus::Failed)
                .with_error(format!("bare clone missing at {}", bare.display()))));
        }

        let local = self.git.ref_exists(&bare, &format!("refs/heads/{}", branch)).await?;
        let remote = self.git.ref_exists(&bare, &format!("refs/remotes/origin/{}", branch)).await?;
        if local || remote {
            debug!(%name, %branch, local, remote, "WorktreeEngine::plan: checking out existing branch");
            return Ok(Planned::Ready { bare, path, plan: Plan::Checkout });
        }

        let base = match from {
            Some(base) => base.to_string(),
            None => match state.get(name).and_then(|r| r.default_branch.clone()) {
                Some(base) => base,
                None => self.git.default_branch(&bare).await?,
            },
        };
        // Prefer the freshly fetched remote-tracking ref as the start point
        let base = if self.git.ref_exists(&bare, &format!("refs/remotes/origin/{}", base)).await? {
            format!("origin/{}", base)
        } else {
            base
        };
        debug!(%name, %branch, %base, "WorktreeEngine::plan: creating new branch");
        Ok(Planned::Ready {
            bare,
            path,
            plan: Plan::NewBranch { base },
        })
    }

    fn record(&self, created: &[String], branch: &str, checked_out: bool) -> Result<()> {
        if created.is_empty() && !checked_out {
            return Ok(());
        }
        StateStore::new(&self.ws).update(|state| {
            for name in created {
                state.add_worktree(name, branch);
            }
            if checked_out {
                state.current_branch = Some(branch.to_string());
            }
            Ok(())
        })?;

        if !created.is_empty() {
            let ws = &self.ws;
            if let Err(e) = WorkspaceFile::update(&ws.workspace_file_path(), |file| {
                for name in created {
                    file.add_worktree(ws, name, branch);
                }
            }) {
                warn!("Failed to update workspace file: {}", e.chain_message());
            }
        }
        Ok(())
    }
}

/// One row of `fa wt list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeEntry {
    pub repo: String,
    pub branch: String,
    pub path: PathBuf,
    /// Directory is present on disk
    pub present: bool,
    pub current: bool,
}

/// Every recorded worktree, flagging the current branch and missing directories
pub fn list_worktrees(ws: &Workspace, state: &State) -> Vec<WorktreeEntry> {
    state
        .worktrees()
        .into_iter()
        .map(|(repo, branch)| {
            let path = ws.worktree_path(&repo, &branch);
            WorktreeEntry {
                present: path.is_dir(),
                current: state.current_branch.as_deref() == Some(branch.as_str()),
                repo,
                branch,
                path,
            }
        })
        .collect()
}
