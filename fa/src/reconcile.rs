//! Declared configuration versus persisted state

use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::config::RepoDecl;
use crate::state::State;

/// Which declared repositories still need cloning, which are already
/// materialized, and which state entries are no longer declared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub to_clone: Vec<RepoDecl>,
    pub up_to_date: Vec<String>,
    pub stale: Vec<String>,
}

impl Reconciliation {
    pub fn is_converged(&self) -> bool {
        self.to_clone.is_empty() && self.stale.is_empty()
    }
}

/// Compare declarations with state by repository name
///
/// Declarations without a name are left out of the comparison entirely.
/// `to_clone` keeps declaration order; `up_to_date` and `stale` follow it and
/// state key order respectively.
pub fn reconcile(declared: &[RepoDecl], state: &State) -> Reconciliation {
    debug!(declared = declared.len(), in_state = state.repositories.len(), "reconcile: called");
    let mut result = Reconciliation::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for decl in declared {
        let Some(name) = decl.name.as_deref() else {
            debug!(url = %decl.url, "reconcile: skipping nameless declaration");
            continue;
        };
        if !seen.insert(name) {
            continue;
        }
        if state.contains(name) {
            result.up_to_date.push(name.to_string());
        } else {
            result.to_clone.push(decl.clone());
        }
    }

    result.stale = state
        .repositories
        .keys()
        .filter(|name| !seen.contains(name.as_str()))
        .cloned()
        .collect();

    debug!(
        to_clone = result.to_clone.len(),
        up_to_date = result.up_to_date.len(),
        stale = result.stale.len(),
        "reconcile: done"
    );
    result
}
