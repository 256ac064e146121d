//! Repairs for fixable check results
//!
//! Every routine is idempotent and only ever touches what its check reports.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{FaError, Result};
use crate::state::{Repository, State, StateStore};
use crate::vscode::WorkspaceFile;
use crate::workspace::Workspace;

use super::checks::{is_worktree_dir, orphaned_repos, orphaned_worktrees, relative_branch};
use super::{CheckResult, Doctor, DoctorContext};

/// A repair routine
pub type FixFn = fn(&DoctorContext) -> Result<()>;

/// Name-indexed repair table
pub struct Fixer {
    doctor: Doctor,
    routines: HashMap<&'static str, FixFn>,
}

impl Fixer {
    /// Routines for the built-in checks
    pub fn standard() -> Self {
        let mut routines: HashMap<&'static str, FixFn> = HashMap::new();
        routines.insert("structure", fix_structure);
        routines.insert("state", regenerate_state);
        routines.insert("orphaned-repos", delete_orphaned_repos);
        routines.insert("orphaned-worktrees", delete_orphaned_worktrees);
        routines.insert("consistency", prune_stale_entries);
        routines.insert("workspace-file", rebuild_workspace_file);
        Self {
            doctor: Doctor::standard(),
            routines,
        }
    }

    pub fn new(doctor: Doctor) -> Self {
        Self {
            doctor,
            routines: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, routine: FixFn) {
        self.routines.insert(name, routine);
    }

    pub fn has_fix(&self, name: &str) -> bool {
        self.routines.contains_key(name)
    }

    /// Repair what `result` reports and return the check's fresh verdict
    ///
    /// Passing or non-fixable results and names without a routine come back
    /// unchanged.
    pub fn fix(&self, ctx: &DoctorContext, result: &CheckResult) -> Result<CheckResult> {
        debug!(name = %result.name, status = ?result.status, "Fixer::fix: called");
        if result.is_pass() || !result.fixable {
            return Ok(result.clone());
        }
        let Some(routine) = self.routines.get(result.name.as_str()) else {
            debug!(name = %result.name, "Fixer::fix: no routine registered");
            return Ok(result.clone());
        };

        routine(ctx)?;
        info!("Applied fix for '{}'", result.name);
        Ok(self.doctor.run_one(&result.name, ctx).unwrap_or_else(|| result.clone()))
    }

    /// Run every check in order, fixing each fixable finding before moving on
    ///
    /// A routine that errors leaves the original result in place with the
    /// error appended to its message.
    pub fn run_and_fix(&self, ctx: &DoctorContext) -> Vec<CheckResult> {
        debug!("Fixer::run_and_fix: called");
        self.doctor
            .check_names()
            .into_iter()
            .filter_map(|name| self.doctor.run_one(name, ctx))
            .map(|result| match self.fix(ctx, &result) {
                Ok(fixed) => fixed,
                Err(e) => {
                    warn!("Fix for '{}' failed: {}", result.name, e.chain_message());
                    CheckResult {
                        message: format!("{} (fix failed: {})", result.message, e.chain_message()),
                        ..result
                    }
                }
            })
            .collect()
    }
}

impl Default for Fixer {
    fn default() -> Self {
        Self::standard()
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| FaError::io(format!("Failed to create {}", path.display()), e))
}

fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!("Deleted {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FaError::io(format!("Failed to delete {}", path.display()), e)),
    }
}

fn fix_structure(ctx: &DoctorContext) -> Result<()> {
    let ws = &ctx.ws;
    if ws.repos_dir().is_dir() {
        create_dir(&ws.bare_dir())?;
        create_dir(&ws.worktrees_dir())?;
    }
    if ws.foundagent_dir().is_dir() && !ws.state_path().exists() {
        regenerate_state(ctx)?;
    }
    Ok(())
}

/// Rebuild state from the declared repositories that have a bare clone on
/// disk, listing every directory with a `.git` marker as a worktree
fn regenerate_state(ctx: &DoctorContext) -> Result<()> {
    let ws = &ctx.ws;
    let config = ctx.config()?;
    let state = scan_state(ws, &config);
    info!(repos = state.repositories.len(), "Regenerated state from config and disk");
    StateStore::new(ws).save(&state)
}

pub(crate) fn scan_state(ws: &Workspace, config: &Config) -> State {
    let mut state = State::default();
    for decl in &config.repos {
        let Some(name) = decl.name.as_deref() else { continue };
        if !ws.bare_repo_path(name).join("objects").is_dir() {
            debug!(%name, "scan_state: no bare clone, leaving out");
            continue;
        }
        let mut repo = Repository::new(name, decl.url.clone());
        repo.default_branch = decl.default_branch.clone();
        repo.worktrees = scan_worktrees(&ws.repo_worktrees_dir(name));
        state.add_repository(repo);
    }
    state
}

fn scan_worktrees(repo_dir: &Path) -> Vec<String> {
    let mut branches = Vec::new();
    let mut walker = WalkDir::new(repo_dir).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_dir() && is_worktree_dir(entry.path()) {
            branches.push(relative_branch(repo_dir, entry.path()));
            walker.skip_current_dir();
        }
    }
    branches
}

fn delete_orphaned_repos(ctx: &DoctorContext) -> Result<()> {
    let state = ctx.state()?;
    for path in orphaned_repos(&ctx.ws, &state) {
        remove_dir(&path)?;
    }
    Ok(())
}

fn delete_orphaned_worktrees(ctx: &DoctorContext) -> Result<()> {
    let state = ctx.state()?;
    for path in orphaned_worktrees(&ctx.ws, &state) {
        remove_dir(&path)?;
    }
    Ok(())
}

fn prune_stale_entries(ctx: &DoctorContext) -> Result<()> {
    let config = ctx.config()?;
    let configured: HashSet<&str> = config.repos.iter().map(|r| r.url.as_str()).collect();
    StateStore::new(&ctx.ws).update(|state| {
        let stale: Vec<String> = state
            .repositories
            .values()
            .filter(|r| !configured.contains(r.url.as_str()))
            .map(|r| r.name.clone())
            .collect();
        for name in &stale {
            info!("Pruning stale state entry {}", name);
            state.remove_repository(name);
        }
        Ok(())
    })
}

fn rebuild_workspace_file(ctx: &DoctorContext) -> Result<()> {
    let state = ctx.state()?;
    let path = ctx.ws.workspace_file_path();
    let mut file = if path.is_file() {
        WorkspaceFile::load(&path)?
    } else {
        WorkspaceFile::default()
    };
    let keep_root = file.has_root() || !path.is_file();
    file.rebuild_from(&state, &ctx.ws, keep_root);
    file.save(&path)
}
