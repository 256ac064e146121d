//! Built-in checks

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::state::State;
use crate::vscode::WorkspaceFile;
use crate::workspace::Workspace;

use super::{Check, CheckResult, DoctorContext};

fn display(ws: &Workspace, path: &Path) -> String {
    path.strip_prefix(ws.root()).unwrap_or(path).display().to_string()
}

fn listing(items: &[String]) -> String {
    items.join(", ")
}

/// Result for checks that need the state document when it cannot be read
fn state_unavailable(name: &str) -> CheckResult {
    CheckResult::warn(name, "skipped: state could not be loaded")
        .with_remediation("Resolve the 'state' check first")
}

/// A directory holding a `.git` file or directory
pub(crate) fn is_worktree_dir(path: &Path) -> bool {
    path.is_dir() && path.join(".git").exists()
}

/// Bare-store directories not belonging to any repository in state
pub fn orphaned_repos(ws: &Workspace, state: &State) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(ws.bare_dir()) else {
        return Vec::new();
    };
    let known: HashSet<PathBuf> = state.names().iter().map(|n| ws.bare_repo_path(n)).collect();
    let mut orphans: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && !known.contains(p))
        .collect();
    orphans.sort();
    orphans
}

/// Worktree directories not recorded in state
///
/// Branch names may contain `/`, so a recorded `feature/x` makes `feature`
/// an intermediate directory rather than an orphan.
pub fn orphaned_worktrees(ws: &Workspace, state: &State) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(ws.worktrees_dir()) else {
        return Vec::new();
    };
    let mut orphans = Vec::new();
    let mut repo_dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect();
    repo_dirs.sort();

    for repo_dir in repo_dirs {
        let name = repo_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let Some(repo) = state.get(&name) else {
            orphans.push(repo_dir);
            continue;
        };

        let mut walker = WalkDir::new(&repo_dir).min_depth(1).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_dir() {
                continue;
            }
            let rel = relative_branch(&repo_dir, entry.path());
            if repo.has_worktree(&rel) {
                walker.skip_current_dir();
                continue;
            }
            let prefix = format!("{}/", rel);
            if repo.worktrees.iter().any(|b| b.starts_with(&prefix)) {
                continue;
            }
            orphans.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    orphans
}

/// Branch name of a worktree directory relative to its repository directory
pub(crate) fn relative_branch(repo_dir: &Path, path: &Path) -> String {
    path.strip_prefix(repo_dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub struct StructureCheck;

impl Check for StructureCheck {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        let name = self.name();
        let ws = &ctx.ws;
        debug!(root = %ws.root().display(), "StructureCheck::run: called");

        if !ws.config_path().is_file() {
            return CheckResult::fail(name, "Configuration file missing").with_remediation("Run 'fa init'");
        }
        if !ws.foundagent_dir().is_dir() {
            return CheckResult::fail(name, ".foundagent directory missing").with_remediation("Run 'fa init --force'");
        }
        if !ws.state_path().is_file() {
            return CheckResult::fail(name, "State file missing")
                .with_remediation("Run 'fa doctor --fix' to regenerate it")
                .fixable();
        }
        if !ws.repos_dir().is_dir() {
            return CheckResult::fail(name, "repos directory missing").with_remediation("Run 'fa init --force'");
        }

        let missing: Vec<String> = [ws.bare_dir(), ws.worktrees_dir()]
            .iter()
            .filter(|d| !d.is_dir())
            .map(|d| display(ws, d))
            .collect();
        if !missing.is_empty() {
            return CheckResult::warn(name, format!("Missing directories: {}", listing(&missing)))
                .with_remediation("Run 'fa doctor --fix' to create them")
                .fixable();
        }

        CheckResult::pass(name, "Workspace layout complete")
    }
}

/// Load success only; field-level validation happens when the config is loaded
pub struct ConfigCheck;

impl Check for ConfigCheck {
    fn name(&self) -> &'static str {
        "config"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        match ctx.config() {
            Ok(config) => CheckResult::pass(self.name(), format!("{} repositories declared", config.repos.len())),
            Err(e) => CheckResult::fail(self.name(), e.chain_message())
                .with_remediation(format!("Edit {} by hand", display(&ctx.ws, &ctx.ws.config_path()))),
        }
    }
}

pub struct StateCheck;

impl Check for StateCheck {
    fn name(&self) -> &'static str {
        "state"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        match ctx.state() {
            Ok(state) => CheckResult::pass(self.name(), format!("{} repositories recorded", state.repositories.len())),
            Err(e) => CheckResult::fail(self.name(), e.chain_message())
                .with_remediation("Run 'fa doctor --fix' to regenerate state from config and disk")
                .fixable(),
        }
    }
}

pub struct RepositoriesCheck;

impl Check for RepositoriesCheck {
    fn name(&self) -> &'static str {
        "repositories"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        let Ok(state) = ctx.state() else {
            return state_unavailable(self.name());
        };
        let mut issues = Vec::new();
        for name in state.names() {
            let bare = ctx.ws.bare_repo_path(&name);
            if !bare.is_dir() {
                issues.push(format!("{}: bare clone missing", name));
            } else if !bare.join("objects").is_dir() {
                issues.push(format!("{}: bare clone has no objects directory", name));
            }
        }

        if issues.is_empty() {
            CheckResult::pass(self.name(), format!("{} bare clones intact", state.repositories.len()))
        } else {
            CheckResult::fail(self.name(), listing(&issues))
                .with_remediation("Remove the repository with 'fa remove --force' and add it again")
        }
    }
}

pub struct OrphanedReposCheck;

impl Check for OrphanedReposCheck {
    fn name(&self) -> &'static str {
        "orphaned-repos"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        if !ctx.ws.bare_dir().is_dir() {
            return CheckResult::pass(self.name(), "No bare directory to scan");
        }
        let Ok(state) = ctx.state() else {
            return state_unavailable(self.name());
        };
        let orphans: Vec<String> = orphaned_repos(&ctx.ws, &state).iter().map(|p| display(&ctx.ws, p)).collect();
        if orphans.is_empty() {
            CheckResult::pass(self.name(), "No orphaned bare clones")
        } else {
            CheckResult::warn(
                self.name(),
                format!("{} orphaned bare clone(s): {}", orphans.len(), listing(&orphans)),
            )
            .with_remediation("Run 'fa doctor --fix' to delete them")
            .fixable()
        }
    }
}

pub struct OrphanedWorktreesCheck;

impl Check for OrphanedWorktreesCheck {
    fn name(&self) -> &'static str {
        "orphaned-worktrees"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        if !ctx.ws.worktrees_dir().is_dir() {
            return CheckResult::pass(self.name(), "No worktrees directory to scan");
        }
        let Ok(state) = ctx.state() else {
            return state_unavailable(self.name());
        };
        let orphans: Vec<String> = orphaned_worktrees(&ctx.ws, &state)
            .iter()
            .map(|p| display(&ctx.ws, p))
            .collect();
        if orphans.is_empty() {
            CheckResult::pass(self.name(), "No orphaned worktrees")
        } else {
            CheckResult::warn(
                self.name(),
                format!("{} orphaned worktree(s): {}", orphans.len(), listing(&orphans)),
            )
            .with_remediation("Run 'fa doctor --fix' to delete them")
            .fixable()
        }
    }
}

pub struct WorktreesCheck;

impl Check for WorktreesCheck {
    fn name(&self) -> &'static str {
        "worktrees"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        let Ok(state) = ctx.state() else {
            return state_unavailable(self.name());
        };
        let worktrees = state.worktrees();
        let mut issues = Vec::new();
        for (repo, branch) in &worktrees {
            let path = ctx.ws.worktree_path(repo, branch);
            if !path.is_dir() {
                issues.push(format!("{}/{}: directory missing", repo, branch));
            } else if !is_worktree_dir(&path) {
                issues.push(format!("{}/{}: not a git worktree", repo, branch));
            }
        }

        if issues.is_empty() {
            CheckResult::pass(self.name(), format!("{} worktrees intact", worktrees.len()))
        } else {
            CheckResult::fail(self.name(), listing(&issues))
                .with_remediation("Recreate the worktree with 'fa wt create' or remove the repository")
        }
    }
}

pub struct ConsistencyCheck;

impl Check for ConsistencyCheck {
    fn name(&self) -> &'static str {
        "consistency"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        let Ok(config) = ctx.config() else {
            return CheckResult::warn(self.name(), "skipped: config could not be loaded")
                .with_remediation("Resolve the 'config' check first");
        };
        let Ok(state) = ctx.state() else {
            return state_unavailable(self.name());
        };

        let configured: BTreeSet<&str> = config.repos.iter().map(|r| r.url.as_str()).collect();
        let missing: Vec<String> = config
            .repos
            .iter()
            .filter(|r| !state.contains_url(&r.url))
            .map(|r| r.name.clone().unwrap_or_else(|| r.url.clone()))
            .collect();
        let stale: Vec<String> = state
            .repositories
            .values()
            .filter(|r| !configured.contains(r.url.as_str()))
            .map(|r| r.name.clone())
            .collect();

        if !missing.is_empty() {
            let mut message = format!("Configured but not cloned: {}", listing(&missing));
            if !stale.is_empty() {
                message.push_str(&format!("; not configured: {}", listing(&stale)));
            }
            let result = CheckResult::fail(self.name(), message);
            if stale.is_empty() {
                return result.with_remediation("Run 'fa add' to clone them");
            }
            return result
                .with_remediation("Run 'fa add' to clone them; 'fa doctor --fix' prunes the stale entries")
                .fixable();
        }
        if !stale.is_empty() {
            return CheckResult::warn(self.name(), format!("Stale state entries: {}", listing(&stale)))
                .with_remediation("Run 'fa doctor --fix' to prune them")
                .fixable();
        }
        CheckResult::pass(self.name(), "Config and state agree")
    }
}

pub struct WorkspaceFileCheck;

impl Check for WorkspaceFileCheck {
    fn name(&self) -> &'static str {
        "workspace-file"
    }

    fn run(&self, ctx: &DoctorContext) -> CheckResult {
        let path = ctx.ws.workspace_file_path();
        if !path.is_file() {
            return CheckResult::warn(self.name(), format!("{} missing", display(&ctx.ws, &path)))
                .with_remediation("Run 'fa doctor --fix' to recreate it")
                .fixable();
        }
        let file = match WorkspaceFile::load(&path) {
            Ok(file) => file,
            Err(e) => {
                return CheckResult::fail(self.name(), e.chain_message())
                    .with_remediation(format!("Fix or delete {}", display(&ctx.ws, &path)));
            }
        };
        let Ok(state) = ctx.state() else {
            return state_unavailable(self.name());
        };

        let listed: BTreeSet<String> = file.worktree_folders().into_iter().collect();
        let expected: BTreeSet<String> = state.worktree_folder_refs(&ctx.ws).into_iter().collect();
        let missing = expected.difference(&listed).count();
        let extra = listed.difference(&expected).count();

        if missing == 0 && extra == 0 {
            CheckResult::pass(self.name(), format!("{} worktree folders listed", listed.len()))
        } else {
            CheckResult::warn(
                self.name(),
                format!("Folder list out of date: {} missing, {} extra", missing, extra),
            )
            .with_remediation("Run 'fa doctor --fix' to rebuild the folder list")
            .fixable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RepoDecl};
    use crate::doctor::CheckStatus;
    use crate::state::{Repository, StateStore};
    use tempfile::{TempDir, tempdir};

    /// Initialized workspace with one recorded repository `api` on `main`
    fn workspace() -> (TempDir, DoctorContext) {
        let temp = tempdir().unwrap();
        let ws = Workspace::init(temp.path(), Some("demo"), false).unwrap();

        let mut config = Config::load(&ws.config_path()).unwrap();
        config.repos.push(RepoDecl::named("git@example.com:org/api.git", "api"));
        config.save(&ws.config_path()).unwrap();

        fs::create_dir_all(ws.bare_repo_path("api").join("objects")).unwrap();
        let wt = ws.worktree_path("api", "main");
        fs::create_dir_all(&wt).unwrap();
        fs::write(wt.join(".git"), "gitdir: x\n").unwrap();

        let mut state = State::default();
        state.add_repository(Repository::new("api", "git@example.com:org/api.git"));
        state.add_worktree("api", "main");
        StateStore::new(&ws).save(&state).unwrap();

        WorkspaceFile::update(&ws.workspace_file_path(), |f| {
            f.add_worktree(&ws, "api", "main");
        })
        .unwrap();

        (temp, DoctorContext::new(ws))
    }

    #[test]
    fn test_healthy_workspace_passes_everything() {
        let (_temp, ctx) = workspace();
        for result in crate::doctor::Doctor::standard().run(&ctx) {
            assert_eq!(result.status, CheckStatus::Pass, "{}: {}", result.name, result.message);
        }
    }

    #[test]
    fn test_structure_verdicts() {
        let (_temp, ctx) = workspace();

        fs::remove_dir_all(ctx.ws.bare_dir()).unwrap();
        let r = StructureCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Warn, true));

        fs::remove_file(ctx.ws.state_path()).unwrap();
        let r = StructureCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Fail, true));

        fs::remove_file(ctx.ws.config_path()).unwrap();
        let r = StructureCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Fail, false));
    }

    #[test]
    fn test_config_and_state_load_failures() {
        let (_temp, ctx) = workspace();
        fs::write(ctx.ws.config_path(), "repos: [unclosed").unwrap();
        fs::write(ctx.ws.state_path(), "{ nope").unwrap();

        let config = ConfigCheck.run(&ctx);
        assert_eq!((config.status, config.fixable), (CheckStatus::Fail, false));
        let state = StateCheck.run(&ctx);
        assert_eq!((state.status, state.fixable), (CheckStatus::Fail, true));
    }

    #[test]
    fn test_repository_without_objects_fails() {
        let (_temp, ctx) = workspace();
        fs::remove_dir_all(ctx.ws.bare_repo_path("api").join("objects")).unwrap();

        let r = RepositoriesCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Fail, false));
        assert!(r.message.contains("no objects"));
    }

    #[test]
    fn test_orphaned_repos() {
        let (_temp, ctx) = workspace();
        fs::create_dir_all(ctx.ws.bare_repo_path("ghost")).unwrap();

        let r = OrphanedReposCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Warn, true));
        assert!(r.message.contains("ghost.git"));

        fs::remove_dir_all(ctx.ws.bare_dir()).unwrap();
        assert!(OrphanedReposCheck.run(&ctx).is_pass());
    }

    #[test]
    fn test_nested_branches_are_not_orphans() {
        let (_temp, ctx) = workspace();
        let ws = &ctx.ws;
        StateStore::new(ws)
            .update(|s| {
                s.add_worktree("api", "feature/x");
                Ok(())
            })
            .unwrap();
        let nested = ws.worktree_path("api", "feature/x");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(".git"), "gitdir: x\n").unwrap();
        fs::create_dir_all(ws.worktree_path("api", "feature/old")).unwrap();
        fs::create_dir_all(ws.worktree_path("ghost", "main")).unwrap();

        let state = ctx.state().unwrap();
        let orphans: Vec<String> = orphaned_worktrees(ws, &state).iter().map(|p| display(ws, p)).collect();
        assert_eq!(orphans, vec!["repos/worktrees/api/feature/old", "repos/worktrees/ghost"]);
    }

    #[test]
    fn test_worktree_without_marker_fails() {
        let (_temp, ctx) = workspace();
        fs::remove_file(ctx.ws.worktree_path("api", "main").join(".git")).unwrap();

        let r = WorktreesCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Fail, false));
        assert!(r.message.contains("not a git worktree"));
    }

    #[test]
    fn test_consistency_directions() {
        let (_temp, ctx) = workspace();
        let store = StateStore::new(&ctx.ws);

        store
            .update(|s| {
                s.add_repository(Repository::new("old", "git@example.com:org/old.git"));
                Ok(())
            })
            .unwrap();
        let r = ConsistencyCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Warn, true));

        let mut config = ctx.config().unwrap();
        config.repos.push(RepoDecl::named("git@example.com:org/web.git", "web"));
        config.save(&ctx.ws.config_path()).unwrap();
        let r = ConsistencyCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Fail, true));
        assert!(r.message.contains("web"));

        store
            .update(|s| {
                s.remove_repository("old");
                Ok(())
            })
            .unwrap();
        let r = ConsistencyCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Fail, false));
    }

    #[test]
    fn test_workspace_file_counts_both_directions() {
        let (_temp, ctx) = workspace();
        WorkspaceFile::update(&ctx.ws.workspace_file_path(), |f| {
            f.folders.retain(|folder| folder.is_root());
            f.add_worktree(&ctx.ws, "gone", "main");
            f.add_worktree(&ctx.ws, "gone", "dev");
        })
        .unwrap();

        let r = WorkspaceFileCheck.run(&ctx);
        assert_eq!((r.status, r.fixable), (CheckStatus::Warn, true));
        assert!(r.message.contains("1 missing, 2 extra"), "{}", r.message);
    }
}
