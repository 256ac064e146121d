//! GitCli - [`GitBackend`] implemented by running the `git` binary

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{DiffStat, GitBackend, GitError, GitResult};

/// Runs `git` subprocesses; holds no state
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    /// Run git in `dir` and return the raw output whatever the exit status
    async fn output(&self, dir: &Path, args: &[&str]) -> GitResult<Output> {
        debug!(dir = %dir.display(), ?args, "GitCli::output: called");
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await?;
        debug!(status = ?output.status.code(), "GitCli::output: finished");
        Ok(output)
    }

    /// Run git in `dir`, failing on non-zero exit, and return trimmed stdout
    async fn run(&self, dir: &Path, args: &[&str]) -> GitResult<String> {
        let output = self.output(dir, args).await?;
        if !output.status.success() {
            debug!(?args, "GitCli::run: command failed");
            return Err(GitError::failed(args, &output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Exit 0 → true, exit 1 → false, anything else is an error
    async fn probe(&self, dir: &Path, args: &[&str]) -> GitResult<bool> {
        let output = self.output(dir, args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::failed(args, &output.stderr)),
        }
    }

    async fn stash_ref(&self, worktree: &Path) -> GitResult<Option<String>> {
        let output = self.output(worktree, &["rev-parse", "-q", "--verify", "refs/stash"]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Point a freshly checked-out branch at `origin/<branch>` when that ref exists
    async fn track_origin(&self, worktree: &Path, branch: &str) {
        let remote_ref = format!("refs/remotes/origin/{}", branch);
        match self.ref_exists(worktree, &remote_ref).await {
            Ok(true) => {
                let upstream = format!("origin/{}", branch);
                if let Err(e) = self.run(worktree, &["branch", "--set-upstream-to", &upstream]).await {
                    warn!("Failed to set upstream {} in {}: {}", upstream, worktree.display(), e);
                }
            }
            Ok(false) => debug!(%branch, "GitCli::track_origin: no remote branch"),
            Err(e) => warn!("Failed to check {} in {}: {}", remote_ref, worktree.display(), e),
        }
    }
}

/// Parse `git diff --numstat`; binary files count as changed with no lines
pub(crate) fn parse_numstat(text: &str) -> GitResult<DiffStat> {
    let mut stat = DiffStat::default();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.split('\t');
        let (ins, del) = match (parts.next(), parts.next()) {
            (Some(ins), Some(del)) => (ins, del),
            _ => return Err(GitError::Parse(format!("numstat line: {}", line))),
        };
        stat.files_changed += 1;
        if ins != "-" {
            stat.insertions += ins
                .parse::<usize>()
                .map_err(|_| GitError::Parse(format!("numstat line: {}", line)))?;
        }
        if del != "-" {
            stat.deletions += del
                .parse::<usize>()
                .map_err(|_| GitError::Parse(format!("numstat line: {}", line)))?;
        }
    }
    Ok(stat)
}

#[async_trait]
impl GitBackend for GitCli {
    async fn clone_bare(&self, url: &str, dest: &Path) -> GitResult<()> {
        debug!(%url, dest = %dest.display(), "GitCli::clone_bare: called");
        let parent = dest.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let dest_str = dest.to_string_lossy();
        self.run(parent, &["clone", "--bare", url, &dest_str]).await?;

        // Bare clones have no fetch refspec; add one so origin/<branch> refs exist
        self.run(
            dest,
            &["config", "remote.origin.fetch", "+refs/heads/*:refs/remotes/origin/*"],
        )
        .await?;
        self.run(dest, &["fetch", "origin"]).await?;

        info!("Cloned {} into {}", url, dest.display());
        Ok(())
    }

    async fn default_branch(&self, bare: &Path) -> GitResult<String> {
        debug!(bare = %bare.display(), "GitCli::default_branch: called");
        let branch = self.run(bare, &["symbolic-ref", "--short", "HEAD"]).await?;
        if branch.is_empty() {
            return Err(GitError::Parse("empty HEAD reference".to_string()));
        }
        Ok(branch)
    }

    async fn worktree_add(&self, bare: &Path, path: &Path, branch: &str) -> GitResult<()> {
        debug!(bare = %bare.display(), path = %path.display(), %branch, "GitCli::worktree_add: called");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path_str = path.to_string_lossy();
        self.run(bare, &["worktree", "add", &path_str, branch]).await?;
        self.track_origin(path, branch).await;
        info!("Created worktree at {} on branch {}", path.display(), branch);
        Ok(())
    }

    async fn worktree_add_new_branch(&self, bare: &Path, path: &Path, branch: &str, base: &str) -> GitResult<()> {
        debug!(
            bare = %bare.display(),
            path = %path.display(),
            %branch,
            %base,
            "GitCli::worktree_add_new_branch: called"
        );
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path_str = path.to_string_lossy();
        self.run(bare, &["worktree", "add", "-b", branch, &path_str, base]).await?;
        info!("Created worktree at {} on new branch {} from {}", path.display(), branch, base);
        Ok(())
    }

    async fn fetch(&self, bare: &Path) -> GitResult<()> {
        debug!(bare = %bare.display(), "GitCli::fetch: called");
        self.run(bare, &["fetch", "--prune", "origin"]).await?;
        Ok(())
    }

    async fn pull(&self, worktree: &Path) -> GitResult<()> {
        debug!(worktree = %worktree.display(), "GitCli::pull: called");
        self.run(worktree, &["pull", "--ff-only"]).await?;
        Ok(())
    }

    async fn push(&self, worktree: &Path, remote: &str, remote_branch: &str, set_upstream: bool) -> GitResult<()> {
        debug!(worktree = %worktree.display(), %remote, %remote_branch, set_upstream, "GitCli::push: called");
        let refspec = format!("HEAD:{}", remote_branch);
        let mut args = vec!["push"];
        if set_upstream {
            args.push("-u");
        }
        args.push(remote);
        args.push(refspec.as_str());
        self.run(worktree, &args).await?;
        Ok(())
    }

    async fn commit(&self, worktree: &Path, message: &str, amend: bool) -> GitResult<()> {
        debug!(worktree = %worktree.display(), amend, "GitCli::commit: called");
        let mut args = vec!["commit"];
        if amend {
            args.push("--amend");
        }
        if message.is_empty() && amend {
            args.push("--no-edit");
        } else {
            args.push("-m");
            args.push(message);
        }
        self.run(worktree, &args).await?;
        Ok(())
    }

    async fn stage_tracked(&self, worktree: &Path) -> GitResult<()> {
        debug!(worktree = %worktree.display(), "GitCli::stage_tracked: called");
        self.run(worktree, &["add", "-u"]).await?;
        Ok(())
    }

    async fn stash(&self, worktree: &Path) -> GitResult<bool> {
        debug!(worktree = %worktree.display(), "GitCli::stash: called");
        let before = self.stash_ref(worktree).await?;
        self.run(worktree, &["stash", "push", "--include-untracked"]).await?;
        let after = self.stash_ref(worktree).await?;
        let created = after.is_some() && after != before;
        debug!(created, "GitCli::stash: finished");
        Ok(created)
    }

    async fn stash_pop(&self, worktree: &Path) -> GitResult<()> {
        debug!(worktree = %worktree.display(), "GitCli::stash_pop: called");
        self.run(worktree, &["stash", "pop"]).await?;
        Ok(())
    }

    async fn head_sha(&self, worktree: &Path) -> GitResult<Option<String>> {
        let output = self.output(worktree, &["rev-parse", "-q", "--verify", "HEAD"]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    async fn is_detached(&self, worktree: &Path) -> GitResult<bool> {
        let on_branch = self.probe(worktree, &["symbolic-ref", "-q", "HEAD"]).await?;
        Ok(!on_branch)
    }

    async fn current_branch(&self, worktree: &Path) -> GitResult<Option<String>> {
        let output = self.output(worktree, &["symbolic-ref", "-q", "--short", "HEAD"]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    async fn upstream(&self, worktree: &Path) -> GitResult<Option<String>> {
        let output = self
            .output(worktree, &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await?;
        if output.status.success() {
            let upstream = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok((!upstream.is_empty()).then_some(upstream))
        } else {
            Ok(None)
        }
    }

    async fn ref_exists(&self, worktree: &Path, reference: &str) -> GitResult<bool> {
        self.probe(worktree, &["show-ref", "--verify", "--quiet", reference]).await
    }

    async fn ahead_count(&self, worktree: &Path, base: &str) -> GitResult<usize> {
        let range = format!("{}..HEAD", base);
        let out = self.run(worktree, &["rev-list", "--count", &range]).await?;
        out.parse::<usize>()
            .map_err(|_| GitError::Parse(format!("rev-list count: {}", out)))
    }

    async fn has_staged_changes(&self, worktree: &Path) -> GitResult<bool> {
        let clean = self.probe(worktree, &["diff", "--cached", "--quiet"]).await?;
        Ok(!clean)
    }

    async fn diff_stat(&self, worktree: &Path, include_unstaged: bool) -> GitResult<DiffStat> {
        let args: &[&str] = if include_unstaged {
            &["diff", "HEAD", "--numstat"]
        } else {
            &["diff", "--cached", "--numstat"]
        };
        let out = self.run(worktree, args).await?;
        parse_numstat(&out)
    }

    async fn has_uncommitted_changes(&self, worktree: &Path) -> GitResult<bool> {
        let out = self.run(worktree, &["status", "--porcelain"]).await?;
        Ok(!out.is_empty())
    }
}
