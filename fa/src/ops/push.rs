//! Push the same branch from every repository

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::git::{GitBackend, GitResult};
use crate::parallel;
use crate::state::State;
use crate::workspace::Workspace;

use super::select_repos;

const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub dry_run: bool,
    /// Restrict to these repositories (empty means all)
    pub repos: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushStatus {
    Pushed,
    WouldPush,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushResult {
    pub repo: String,
    pub branch: String,
    pub status: PushStatus,
    pub commits_ahead: usize,
    /// Remote ref the push goes to, e.g. `origin/main`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResult {
    fn new(repo: &str, branch: &str, status: PushStatus) -> Self {
        Self {
            repo: repo.to_string(),
            branch: branch.to_string(),
            status,
            commits_ahead: 0,
            target: None,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Unpushed commits and where they would go
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Unpushed {
    /// Remote-tracking ref the push updates, e.g. `origin/main`
    pub target: String,
    pub remote: String,
    /// Branch on the remote that receives HEAD
    pub remote_branch: String,
    pub count: usize,
    /// No upstream is configured, so the push should set one
    pub set_upstream: bool,
}

/// Two-tier detection: configured upstream first, then `origin/<current branch>`
///
/// `branch` is only used when the worktree cannot report its own branch.
/// Returns `None` when neither exists; that is "nothing to push", not an error.
pub(crate) async fn unpushed(git: &dyn GitBackend, worktree: &Path, branch: &str) -> GitResult<Option<Unpushed>> {
    if let Some(upstream) = git.upstream(worktree).await? {
        let (remote, remote_branch) = upstream.split_once('/').unwrap_or((DEFAULT_REMOTE, upstream.as_str()));
        let (remote, remote_branch) = (remote.to_string(), remote_branch.to_string());
        let count = git.ahead_count(worktree, &upstream).await?;
        debug!(%upstream, count, "unpushed: using configured upstream");
        return Ok(Some(Unpushed {
            target: upstream,
            remote,
            remote_branch,
            count,
            set_upstream: false,
        }));
    }

    let local = git.current_branch(worktree).await?.unwrap_or_else(|| branch.to_string());
    let fallback = format!("{}/{}", DEFAULT_REMOTE, local);
    let fallback_ref = format!("refs/remotes/{}", fallback);
    if git.ref_exists(worktree, &fallback_ref).await? {
        let count = git.ahead_count(worktree, &fallback).await?;
        debug!(%fallback, count, "unpushed: using remote branch fallback");
        return Ok(Some(Unpushed {
            target: fallback,
            remote: DEFAULT_REMOTE.to_string(),
            remote_branch: local,
            count,
            set_upstream: true,
        }));
    }

    debug!(%local, "unpushed: no upstream and no remote branch");
    Ok(None)
}

struct Pending {
    slot: usize,
    path: PathBuf,
    unpushed: Unpushed,
}

pub struct PushEngine {
    ws: Workspace,
    git: Arc<dyn GitBackend>,
}

impl PushEngine {
    pub fn new(ws: Workspace, git: Arc<dyn GitBackend>) -> Self {
        Self { ws, git }
    }

    pub async fn run(&self, state: &State, branch: &str, opts: &PushOptions) -> Result<Vec<PushResult>> {
        debug!(%branch, dry_run = opts.dry_run, "PushEngine::run: called");
        let names = select_repos(state, &opts.repos)?;
        let mut slots: Vec<Option<PushResult>> = vec![None; names.len()];
        let mut pending: HashMap<String, Pending> = HashMap::new();

        for (slot, name) in names.iter().enumerate() {
            let path = self.ws.worktree_path(name, branch);
            let listed = state.get(name).map(|r| r.has_worktree(branch)).unwrap_or(false);
            if !listed || !path.is_dir() {
                slots[slot] = Some(
                    PushResult::new(name, branch, PushStatus::Skipped)
                        .with_error(format!("no worktree for branch '{}'", branch)),
                );
                continue;
            }

            match self.snapshot(&path, branch).await {
                Ok(Snapshot::Detached) => {
                    slots[slot] = Some(PushResult::new(name, branch, PushStatus::Skipped).with_error("HEAD is detached"));
                }
                Ok(Snapshot::NoRemote) => {
                    slots[slot] = Some(
                        PushResult::new(name, branch, PushStatus::Skipped)
                            .with_error("nothing to push: no upstream or remote branch"),
                    );
                }
                Ok(Snapshot::Ahead(u)) if u.count == 0 => {
                    slots[slot] = Some(PushResult {
                        target: Some(u.target),
                        ..PushResult::new(name, branch, PushStatus::Skipped).with_error("nothing to push: up to date")
                    });
                }
                Ok(Snapshot::Ahead(u)) if opts.dry_run => {
                    slots[slot] = Some(PushResult {
                        commits_ahead: u.count,
                        target: Some(u.target),
                        ..PushResult::new(name, branch, PushStatus::WouldPush)
                    });
                }
                Ok(Snapshot::Ahead(unpushed)) => {
                    pending.insert(name.clone(), Pending { slot, path, unpushed });
                }
                Err(e) => {
                    slots[slot] = Some(PushResult::new(name, branch, PushStatus::Failed).with_error(e.chain_message()));
                }
            }
        }

        let dispatch: Vec<String> = names.iter().filter(|n| pending.contains_key(*n)).cloned().collect();
        debug!(count = dispatch.len(), "PushEngine::run: dispatching pushes");
        let outcomes = parallel::execute(&dispatch, |name| {
            let git = self.git.clone();
            let p = &pending[&name];
            let path = p.path.clone();
            let remote = p.unpushed.remote.clone();
            let remote_branch = p.unpushed.remote_branch.clone();
            let set_upstream = p.unpushed.set_upstream;
            async move {
                git.push(&path, &remote, &remote_branch, set_upstream).await?;
                Ok(())
            }
        })
        .await;

        for outcome in outcomes {
            let p = &pending[&outcome.item];
            let base = PushResult {
                commits_ahead: p.unpushed.count,
                target: Some(p.unpushed.target.clone()),
                ..PushResult::new(&outcome.item, branch, PushStatus::Pushed)
            };
            slots[p.slot] = Some(match outcome.result {
                Ok(()) => base,
                Err(e) => PushResult {
                    status: PushStatus::Failed,
                    error: Some(e.chain_message()),
                    ..base
                },
            });
        }

        let results: Vec<PushResult> = slots.into_iter().flatten().collect();
        info!(
            pushed = results.iter().filter(|r| r.status == PushStatus::Pushed).count(),
            total = results.len(),
            "Push finished on branch {}",
            branch
        );
        Ok(results)
    }

    async fn snapshot(&self, path: &Path, branch: &str) -> Result<Snapshot> {
        if self.git.is_detached(path).await? {
            return Ok(Snapshot::Detached);
        }
        Ok(match unpushed(self.git.as_ref(), path, branch).await? {
            Some(u) => Snapshot::Ahead(u),
            None => Snapshot::NoRemote,
        })
    }
}

enum Snapshot {
    Detached,
    NoRemote,
    Ahead(Unpushed),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeRepo;
    use crate::ops::testutil::Fixture;

    fn ahead_of_upstream(count: usize) -> FakeRepo {
        FakeRepo {
            upstream: Some("origin/main".to_string()),
            remote_refs: vec!["refs/remotes/origin/main".to_string()],
            ahead: count,
            ..FakeRepo::on_branch("main")
        }
    }

    #[tokio::test]
    async fn test_push_with_upstream() {
        let mut fx = Fixture::new();
        let wt = fx.add_worktree("api", "main", ahead_of_upstream(2));
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(results[0].status, PushStatus::Pushed);
        assert_eq!(results[0].commits_ahead, 2);
        assert_eq!(results[0].target.as_deref(), Some("origin/main"));
        assert_eq!(fx.git.repo(&wt).ahead, 0);
    }

    #[tokio::test]
    async fn test_fallback_to_remote_branch_without_upstream() {
        let mut fx = Fixture::new();
        fx.add_worktree(
            "api",
            "main",
            FakeRepo {
                remote_refs: vec!["refs/remotes/origin/main".to_string()],
                ahead: 1,
                ..FakeRepo::on_branch("main")
            },
        );
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(results[0].status, PushStatus::Pushed);
        assert_eq!(results[0].target.as_deref(), Some("origin/main"));
    }

    #[tokio::test]
    async fn test_no_upstream_and_no_remote_branch_is_skipped() {
        let mut fx = Fixture::new();
        fx.add_worktree(
            "api",
            "main",
            FakeRepo {
                ahead: 3,
                ..FakeRepo::on_branch("main")
            },
        );
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(results[0].status, PushStatus::Skipped);
        assert!(results[0].error.as_deref().unwrap().contains("nothing to push"));
        assert!(!fx.git.called("push"));
    }

    #[tokio::test]
    async fn test_up_to_date_is_skipped() {
        let mut fx = Fixture::new();
        fx.add_worktree("api", "main", ahead_of_upstream(0));
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(results[0].status, PushStatus::Skipped);
        assert!(!fx.git.called("push"));
    }

    #[tokio::test]
    async fn test_dry_run_matches_real_push() {
        let mut fx = Fixture::new();
        fx.add_worktree("api", "main", ahead_of_upstream(4));
        fx.add_worktree("web", "main", ahead_of_upstream(0));
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let preview = engine
            .run(
                &fx.state,
                "main",
                &PushOptions {
                    dry_run: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!fx.git.called("push"));

        let real = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        for (p, r) in preview.iter().zip(&real) {
            if r.status == PushStatus::Pushed {
                assert_eq!(p.status, PushStatus::WouldPush);
                assert!(p.commits_ahead > 0);
                assert_eq!(p.commits_ahead, r.commits_ahead);
                assert_eq!(p.target, r.target);
            }
        }
        assert_eq!(real[0].status, PushStatus::Pushed);
        assert_eq!(real[1].status, PushStatus::Skipped);
    }

    #[tokio::test]
    async fn test_failed_push_is_isolated() {
        let mut fx = Fixture::new();
        fx.add_worktree("api", "main", ahead_of_upstream(1).failing("push"));
        fx.add_worktree("web", "main", ahead_of_upstream(1));
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(results[0].status, PushStatus::Failed);
        assert_eq!(results[0].commits_ahead, 1);
        assert_eq!(results[1].status, PushStatus::Pushed);
    }

    #[tokio::test]
    async fn test_detached_head_is_skipped() {
        let mut fx = Fixture::new();
        fx.add_worktree(
            "api",
            "main",
            FakeRepo {
                detached: true,
                ..ahead_of_upstream(1)
            },
        );
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(results[0].status, PushStatus::Skipped);
        assert!(results[0].error.as_deref().unwrap().contains("detached"));
    }

    #[tokio::test]
    async fn test_push_lands_on_upstream_with_different_name() {
        let mut fx = Fixture::new();
        let wt = fx.add_worktree(
            "api",
            "main",
            FakeRepo {
                upstream: Some("origin/release".to_string()),
                remote_refs: vec!["refs/remotes/origin/release".to_string()],
                ahead: 2,
                ..FakeRepo::on_branch("main")
            },
        );
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());
        let dry = PushOptions {
            dry_run: true,
            ..Default::default()
        };

        let preview = engine.run(&fx.state, "main", &dry).await.unwrap();
        let real = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(preview[0].target.as_deref(), Some("origin/release"));
        assert_eq!(real[0].target, preview[0].target);
        assert_eq!(fx.git.repo(&wt).remote_refs, vec!["refs/remotes/origin/release".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_uses_worktree_branch() {
        let mut fx = Fixture::new();
        let wt = fx.add_worktree(
            "api",
            "main",
            FakeRepo {
                remote_refs: vec!["refs/remotes/origin/hotfix".to_string()],
                ahead: 1,
                ..FakeRepo::on_branch("hotfix")
            },
        );
        let engine = PushEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&fx.state, "main", &PushOptions::default()).await.unwrap();

        assert_eq!(results[0].status, PushStatus::Pushed);
        assert_eq!(results[0].target.as_deref(), Some("origin/hotfix"));
        assert!(!fx.git.repo(&wt).remote_refs.contains(&"refs/remotes/origin/main".to_string()));
    }
}
