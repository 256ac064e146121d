//! Materialize declared repositories: bare clone plus default-branch worktree

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{RepoDecl, is_safe_name, unsafe_name};
use crate::error::{ErrorCode, FaError, Result};
use crate::git::GitBackend;
use crate::parallel;
use crate::state::{Repository, StateStore};
use crate::vscode::WorkspaceFile;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloneStatus {
    Cloned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneResult {
    pub repo: String,
    pub url: String,
    pub status: CloneStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    /// Branch checked out right after cloning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What one clone task produced
struct Cloned {
    default_branch: String,
    worktree: Option<String>,
    worktree_error: Option<String>,
}

pub struct CloneEngine {
    ws: Workspace,
    git: Arc<dyn GitBackend>,
}

impl CloneEngine {
    pub fn new(ws: Workspace, git: Arc<dyn GitBackend>) -> Self {
        Self { ws, git }
    }

    /// Clone every declaration in parallel, then record the successes
    ///
    /// State is saved once and the workspace file edited once, after all
    /// clones have finished.
    pub async fn run(&self, decls: &[RepoDecl], auto_worktree: bool) -> Result<Vec<CloneResult>> {
        debug!(count = decls.len(), auto_worktree, "CloneEngine::run: called");
        let mut by_name: HashMap<String, RepoDecl> = HashMap::new();
        let mut names = Vec::with_capacity(decls.len());
        for decl in decls {
            let name = decl.name.clone().ok_or_else(|| {
                FaError::new(ErrorCode::InvalidArgument, format!("Repository '{}' has no name", decl.url))
            })?;
            if !is_safe_name(&name) {
                return Err(unsafe_name(&name, ErrorCode::InvalidArgument));
            }
            if by_name.insert(name.clone(), decl.clone()).is_none() {
                names.push(name);
            }
        }

        let outcomes = parallel::execute(&names, |name| {
            let git = self.git.clone();
            let decl = by_name[&name].clone();
            let bare = self.ws.bare_repo_path(&name);
            let ws = self.ws.clone();
            async move {
                let adopted = bare.join("objects").is_dir();
                if adopted {
                    debug!(%name, "CloneEngine::run: bare store already present, adopting");
                } else if let Err(e) = git.clone_bare(&decl.url, &bare).await {
                    discard(&bare).await;
                    return Err(FaError::from(e));
                }

                let default_branch = match decl.default_branch {
                    Some(branch) => branch,
                    None => match git.default_branch(&bare).await {
                        Ok(branch) => branch,
                        Err(e) => {
                            // Unrecorded stores show up as orphans
                            if !adopted {
                                discard(&bare).await;
                            }
                            return Err(FaError::from(e));
                        }
                    },
                };

                let mut cloned = Cloned {
                    default_branch: default_branch.clone(),
                    worktree: None,
                    worktree_error: None,
                };
                if auto_worktree {
                    let path = ws.worktree_path(&name, &default_branch);
                    match git.worktree_add(&bare, &path, &default_branch).await {
                        Ok(()) => cloned.worktree = Some(default_branch),
                        Err(e) => cloned.worktree_error = Some(FaError::from(e).chain_message()),
                    }
                }
                Ok(cloned)
            }
        })
        .await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut added: Vec<Repository> = Vec::new();
        for outcome in outcomes {
            let url = by_name[&outcome.item].url.clone();
            match outcome.result {
                Ok(cloned) => {
                    let mut repo = Repository::new(outcome.item.clone(), url.clone());
                    repo.default_branch = Some(cloned.default_branch.clone());
                    if let Some(branch) = &cloned.worktree {
                        repo.worktrees.push(branch.clone());
                    }
                    if let Some(e) = &cloned.worktree_error {
                        warn!("Cloned {} but could not create its worktree: {}", outcome.item, e);
                    }
                    added.push(repo);
                    results.push(CloneResult {
                        repo: outcome.item,
                        url,
                        status: CloneStatus::Cloned,
                        default_branch: Some(cloned.default_branch),
                        worktree: cloned.worktree,
                        error: cloned.worktree_error.map(|e| format!("worktree not created: {}", e)),
                    });
                }
                Err(e) => {
                    warn!("Clone failed for {}: {}", outcome.item, e);
                    results.push(CloneResult {
                        repo: outcome.item,
                        url,
                        status: CloneStatus::Failed,
                        default_branch: None,
                        worktree: None,
                        error: Some(e.chain_message()),
                    });
                }
            }
        }

        if !added.is_empty() {
            self.record(&added)?;
        }

        info!(
            cloned = added.len(),
            total = results.len(),
            "Clone finished"
        );
        Ok(results)
    }

    fn record(&self, added: &[Repository]) -> Result<()> {
        debug!(count = added.len(), "CloneEngine::record: called");
        StateStore::new(&self.ws).update(|state| {
            for repo in added {
                state.add_repository(repo.clone());
            }
            Ok(())
        })?;

        let ws = &self.ws;
        if let Err(e) = WorkspaceFile::update(&ws.workspace_file_path(), |file| {
            for repo in added {
                for branch in &repo.worktrees {
                    file.add_worktree(ws, &repo.name, branch);
                }
            }
        }) {
            warn!("Failed to update workspace file: {}", e.chain_message());
        }
        Ok(())
    }
}

/// Remove a partially created bare store
async fn discard(bare: &Path) {
    if bare.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(bare).await {
            warn!("Failed to remove {}: {}", bare.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::Fixture;

    fn decl(name: &str) -> RepoDecl {
        RepoDecl::named(format!("git@example.com:org/{}.git", name), name)
    }

    #[tokio::test]
    async fn test_clone_records_state_and_workspace_file() {
        let fx = Fixture::new();
        let store = fx.persist();
        let engine = CloneEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&[decl("web"), decl("api")], true).await.unwrap();

        assert_eq!(results[0].repo, "web");
        assert_eq!(results[1].repo, "api");
        assert!(results.iter().all(|r| r.status == CloneStatus::Cloned));
        assert_eq!(results[0].worktree.as_deref(), Some("main"));

        let state = store.load().unwrap();
        assert_eq!(state.names(), vec!["api", "web"]);
        assert_eq!(state.get("api").unwrap().worktrees, vec!["main"]);
        assert_eq!(state.get("api").unwrap().default_branch.as_deref(), Some("main"));
        assert!(fx.ws.worktree_path("api", "main").join(".git").exists());

        let file = WorkspaceFile::load(&fx.ws.workspace_file_path()).unwrap();
        assert!(file.has_root());
        assert_eq!(
            file.worktree_folders(),
            vec!["repos/worktrees/web/main", "repos/worktrees/api/main"]
        );
    }

    #[tokio::test]
    async fn test_failed_clone_is_isolated() {
        let fx = Fixture::new();
        let store = fx.persist();
        let engine = CloneEngine::new(fx.ws.clone(), fx.backend());
        let bad = RepoDecl::named("git@unreachable.example:org/bad.git", "bad");

        let results = engine.run(&[bad, decl("api")], false).await.unwrap();

        assert_eq!(results[0].status, CloneStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("could not read"));
        assert_eq!(results[1].status, CloneStatus::Cloned);
        assert_eq!(results[1].worktree, None);

        let state = store.load().unwrap();
        assert_eq!(state.names(), vec!["api"]);
        assert!(state.get("api").unwrap().worktrees.is_empty());
        assert!(!fx.ws.bare_repo_path("bad").exists());
    }

    #[tokio::test]
    async fn test_declared_default_branch_wins() {
        let fx = Fixture::new();
        let store = fx.persist();
        let engine = CloneEngine::new(fx.ws.clone(), fx.backend());
        let mut d = decl("api");
        d.default_branch = Some("develop".to_string());

        let results = engine.run(&[d], true).await.unwrap();

        assert_eq!(results[0].worktree.as_deref(), Some("develop"));
        assert_eq!(store.load().unwrap().get("api").unwrap().worktrees, vec!["develop"]);
    }

    #[tokio::test]
    async fn test_existing_bare_store_is_adopted() {
        let fx = Fixture::new();
        fx.persist();
        let bare = fx.ws.bare_repo_path("api");
        std::fs::create_dir_all(bare.join("objects")).unwrap();
        fx.git.insert(&bare, crate::git::fake::FakeRepo::on_branch("main"));
        let engine = CloneEngine::new(fx.ws.clone(), fx.backend());

        let results = engine.run(&[decl("api")], false).await.unwrap();

        assert_eq!(results[0].status, CloneStatus::Cloned);
        assert!(!fx.git.called("clone_bare"));
    }

    #[tokio::test]
    async fn test_unknown_default_branch_discards_fresh_clone() {
        let fx = Fixture::new();
        let store = fx.persist();
        let engine = CloneEngine::new(fx.ws.clone(), fx.backend());
        let headless = RepoDecl::named("git@example.com:org/headless.git", "headless");

        let results = engine.run(&[headless, decl("api")], false).await.unwrap();

        assert_eq!(results[0].status, CloneStatus::Failed);
        assert!(!fx.ws.bare_repo_path("headless").exists());
        assert_eq!(results[1].status, CloneStatus::Cloned);
        assert_eq!(store.load().unwrap().names(), vec!["api"]);
    }

    #[tokio::test]
    async fn test_unsafe_name_rejected_before_cloning() {
        let fx = Fixture::new();
        let engine = CloneEngine::new(fx.ws.clone(), fx.backend());

        let err = engine
            .run(&[RepoDecl::named("git@example.com:org/api.git", "..")], true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(fx.git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_nameless_declaration_rejected() {
        let fx = Fixture::new();
        let engine = CloneEngine::new(fx.ws.clone(), fx.backend());

        let err = engine.run(&[RepoDecl::new("file:///x")], true).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(fx.git.calls().is_empty());
    }
}
