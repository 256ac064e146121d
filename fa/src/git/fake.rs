//! In-memory [`GitBackend`] for engine tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{DiffStat, GitBackend, GitError, GitResult};

/// Simulated repository (bare store or worktree)
#[derive(Debug, Clone, Default)]
pub struct FakeRepo {
    pub head: Option<String>,
    pub detached: bool,
    pub branch: Option<String>,
    pub staged: DiffStat,
    pub unstaged: DiffStat,
    pub untracked: bool,
    pub upstream: Option<String>,
    pub remote_refs: Vec<String>,
    pub ahead: usize,
    /// Operation names that fail: commit, push, fetch, pull, stage, stash, stash_pop
    pub fail: HashSet<&'static str>,
    /// Commit reports success but HEAD does not move
    pub commit_noop: bool,
    pub stashes: Vec<(DiffStat, DiffStat, bool)>,
    pub delay_ms: u64,
}

impl FakeRepo {
    /// Clean worktree on `branch` at commit `c0`
    pub fn on_branch(branch: &str) -> Self {
        Self {
            head: Some("c0".to_string()),
            branch: Some(branch.to_string()),
            ..Default::default()
        }
    }

    pub fn failing(mut self, op: &'static str) -> Self {
        self.fail.insert(op);
        self
    }

    fn dirty(&self) -> bool {
        !self.staged.is_empty() || !self.unstaged.is_empty() || self.untracked
    }
}

pub fn stat(files: usize, insertions: usize, deletions: usize) -> DiffStat {
    DiffStat {
        files_changed: files,
        insertions,
        deletions,
    }
}

fn add(a: DiffStat, b: DiffStat) -> DiffStat {
    stat(
        a.files_changed + b.files_changed,
        a.insertions + b.insertions,
        a.deletions + b.deletions,
    )
}

#[derive(Debug, Default)]
pub struct FakeGit {
    repos: Mutex<HashMap<PathBuf, FakeRepo>>,
    calls: Mutex<Vec<String>>,
    counter: AtomicUsize,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &Path, repo: FakeRepo) {
        self.repos.lock().unwrap().insert(path.to_path_buf(), repo);
    }

    pub fn repo(&self, path: &Path) -> FakeRepo {
        self.repos.lock().unwrap().get(path).cloned().unwrap_or_default()
    }

    /// Operation names in call order, e.g. `commit`, `push`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, op: &str) -> bool {
        self.calls().iter().any(|c| c == op)
    }

    fn record(&self, op: &str) {
        self.calls.lock().unwrap().push(op.to_string());
    }

    fn with_repo<T>(&self, path: &Path, op: &'static str, f: impl FnOnce(&mut FakeRepo) -> GitResult<T>) -> GitResult<T> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.get_mut(path).ok_or_else(|| GitError::CommandFailed {
            command: op.to_string(),
            stderr: format!("not a git repository: {}", path.display()),
        })?;
        if repo.fail.contains(op) {
            return Err(GitError::CommandFailed {
                command: op.to_string(),
                stderr: "simulated failure".to_string(),
            });
        }
        f(repo)
    }

    async fn delay(&self, path: &Path) {
        let delay = self.repo(path).delay_ms;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn next_sha(&self) -> String {
        format!("c{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl GitBackend for FakeGit {
    async fn clone_bare(&self, url: &str, dest: &Path) -> GitResult<()> {
        self.record("clone_bare");
        if url.contains("unreachable") {
            return Err(GitError::CommandFailed {
                command: "clone".to_string(),
                stderr: format!("could not read from {}", url),
            });
        }
        tokio::fs::create_dir_all(dest.join("objects")).await?;
        let repo = if url.contains("headless") {
            FakeRepo {
                branch: None,
                ..FakeRepo::on_branch("main")
            }
        } else {
            FakeRepo::on_branch("main")
        };
        self.insert(dest, repo);
        Ok(())
    }

    async fn default_branch(&self, bare: &Path) -> GitResult<String> {
        self.with_repo(bare, "default_branch", |r| {
            r.branch.clone().ok_or_else(|| GitError::Parse("no HEAD".to_string()))
        })
    }

    async fn worktree_add(&self, bare: &Path, path: &Path, branch: &str) -> GitResult<()> {
        self.record("worktree_add");
        self.with_repo(bare, "worktree_add", |_| Ok(()))?;
        tokio::fs::create_dir_all(path).await?;
        tokio::fs::write(path.join(".git"), "gitdir: fake\n").await?;
        self.insert(path, FakeRepo::on_branch(branch));
        Ok(())
    }

    async fn worktree_add_new_branch(&self, bare: &Path, path: &Path, branch: &str, _base: &str) -> GitResult<()> {
        self.worktree_add(bare, path, branch).await
    }

    async fn fetch(&self, bare: &Path) -> GitResult<()> {
        self.record("fetch");
        self.delay(bare).await;
        self.with_repo(bare, "fetch", |_| Ok(()))
    }

    async fn pull(&self, worktree: &Path) -> GitResult<()> {
        self.record("pull");
        self.with_repo(worktree, "pull", |_| Ok(()))
    }

    async fn push(&self, worktree: &Path, remote: &str, remote_branch: &str, _set_upstream: bool) -> GitResult<()> {
        self.record("push");
        self.delay(worktree).await;
        self.with_repo(worktree, "push", |r| {
            r.ahead = 0;
            let remote_ref = format!("refs/remotes/{}/{}", remote, remote_branch);
            if !r.remote_refs.contains(&remote_ref) {
                r.remote_refs.push(remote_ref);
            }
            Ok(())
        })
    }

    async fn commit(&self, worktree: &Path, _message: &str, amend: bool) -> GitResult<()> {
        self.record("commit");
        self.delay(worktree).await;
        let sha = self.next_sha();
        self.with_repo(worktree, "commit", |r| {
            if r.commit_noop {
                return Ok(());
            }
            if r.staged.is_empty() && !amend {
                return Err(GitError::CommandFailed {
                    command: "commit".to_string(),
                    stderr: "nothing to commit".to_string(),
                });
            }
            r.head = Some(sha);
            r.staged = DiffStat::default();
            if !amend {
                r.ahead += 1;
            }
            Ok(())
        })
    }

    async fn stage_tracked(&self, worktree: &Path) -> GitResult<()> {
        self.record("stage");
        self.with_repo(worktree, "stage", |r| {
            r.staged = add(r.staged, r.unstaged);
            r.unstaged = DiffStat::default();
            Ok(())
        })
    }

    async fn stash(&self, worktree: &Path) -> GitResult<bool> {
        self.record("stash");
        self.with_repo(worktree, "stash", |r| {
            if !r.dirty() {
                return Ok(false);
            }
            r.stashes.push((r.staged, r.unstaged, r.untracked));
            r.staged = DiffStat::default();
            r.unstaged = DiffStat::default();
            r.untracked = false;
            Ok(true)
        })
    }

    async fn stash_pop(&self, worktree: &Path) -> GitResult<()> {
        self.record("stash_pop");
        self.with_repo(worktree, "stash_pop", |r| {
            let (staged, unstaged, untracked) = r
                .stashes
                .pop()
                .ok_or_else(|| GitError::Parse("no stash entries".to_string()))?;
            r.staged = staged;
            r.unstaged = unstaged;
            r.untracked = untracked;
            Ok(())
        })
    }

    async fn head_sha(&self, worktree: &Path) -> GitResult<Option<String>> {
        self.with_repo(worktree, "head_sha", |r| Ok(r.head.clone()))
    }

    async fn is_detached(&self, worktree: &Path) -> GitResult<bool> {
        self.with_repo(worktree, "is_detached", |r| Ok(r.detached))
    }

    async fn current_branch(&self, worktree: &Path) -> GitResult<Option<String>> {
        self.with_repo(worktree, "current_branch", |r| {
            Ok(if r.detached { None } else { r.branch.clone() })
        })
    }

    async fn upstream(&self, worktree: &Path) -> GitResult<Option<String>> {
        self.with_repo(worktree, "upstream", |r| Ok(r.upstream.clone()))
    }

    async fn ref_exists(&self, worktree: &Path, reference: &str) -> GitResult<bool> {
        self.with_repo(worktree, "ref_exists", |r| Ok(r.remote_refs.iter().any(|x| x == reference)))
    }

    async fn ahead_count(&self, worktree: &Path, _base: &str) -> GitResult<usize> {
        self.with_repo(worktree, "ahead_count", |r| Ok(r.ahead))
    }

    async fn has_staged_changes(&self, worktree: &Path) -> GitResult<bool> {
        self.with_repo(worktree, "has_staged_changes", |r| Ok(!r.staged.is_empty()))
    }

    async fn diff_stat(&self, worktree: &Path, include_unstaged: bool) -> GitResult<DiffStat> {
        self.with_repo(worktree, "diff_stat", |r| {
            Ok(if include_unstaged { add(r.staged, r.unstaged) } else { r.staged })
        })
    }

    async fn has_uncommitted_changes(&self, worktree: &Path) -> GitResult<bool> {
        self.with_repo(worktree, "has_uncommitted_changes", |r| Ok(r.dirty()))
    }
}
