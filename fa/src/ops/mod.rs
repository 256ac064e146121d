//! Cross-repository operation engines
//!
//! Every engine follows the same shape: select repositories, take a cheap
//! synchronous "before" snapshot per repository, dispatch the mutating step
//! through [`crate::parallel::execute`], then classify each slot using the
//! before/after snapshot rather than the subprocess exit status alone.

mod clone;
mod commit;
mod push;
mod sync;
#[cfg(test)]
pub(crate) mod testutil;
mod worktree;

pub use clone::{CloneEngine, CloneResult, CloneStatus};
pub use commit::{CommitEngine, CommitOptions, CommitResult, CommitStatus};
pub use push::{PushEngine, PushOptions, PushResult, PushStatus};
pub use sync::{FetchResult, FetchStatus, PullResult, PullStatus, SyncEngine, SyncOptions, SyncReport};
pub use worktree::{WorktreeEngine, WorktreeEntry, WorktreeOptions, WorktreeResult, WorktreeStatus, list_worktrees};

use tracing::debug;

use crate::config::{is_safe_name, unsafe_name};
use crate::error::{ErrorCode, FaError, Result};
use crate::state::State;

/// Repositories an operation applies to
///
/// An empty filter selects every repository in state (key order). Otherwise
/// the caller's order is kept, duplicates are dropped and any unknown name
/// fails the whole operation before work starts.
pub fn select_repos(state: &State, only: &[String]) -> Result<Vec<String>> {
    debug!(?only, "select_repos: called");
    if only.is_empty() {
        let names = state.names();
        if let Some(bad) = names.iter().find(|n| !is_safe_name(n)) {
            return Err(unsafe_state_key(bad));
        }
        return Ok(names);
    }
    let mut selected: Vec<String> = Vec::with_capacity(only.len());
    for name in only {
        if !state.contains(name) {
            return Err(FaError::repo_not_found(name));
        }
        if !is_safe_name(name) {
            return Err(unsafe_state_key(name));
        }
        if !selected.contains(name) {
            selected.push(name.clone());
        }
    }
    Ok(selected)
}

/// State holds a key that would escape the repository directories
pub(crate) fn unsafe_state_key(name: &str) -> FaError {
    unsafe_name(name, ErrorCode::StateCorrupt)
        .with_remediation("Run 'fa doctor --fix' to regenerate state from the config")
}
