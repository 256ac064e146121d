//! foundagent - multi-repository worktree workspace manager
//!
//! A workspace holds several repositories, each as a bare clone under
//! `repos/.bare` with one worktree per branch under `repos/worktrees`.
//! Three sources describe it: the declared config (`.foundagent.yaml`), the
//! persisted state (`.foundagent/state.json`) and the filesystem. The
//! [`reconcile`] module and the [`doctor`] keep them consistent; the [`ops`]
//! engines run the same git operation across every repository at once
//! through [`parallel::execute`].

pub mod cli;
pub mod config;
pub mod doctor;
pub mod error;
pub mod git;
pub mod ops;
pub mod parallel;
pub mod reconcile;
pub mod remove;
pub mod state;
pub mod vscode;
pub mod workspace;

pub use config::{Config, RepoDecl, Settings};
pub use doctor::{Check, CheckResult, CheckStatus, Doctor, DoctorContext, Fixer};
pub use error::{ErrorCode, FaError, Result};
pub use git::{DiffStat, GitBackend, GitCli, GitError};
pub use reconcile::{Reconciliation, reconcile};
pub use remove::{RemovalResult, RemoveOptions, remove_repo};
pub use state::{Repository, State, StateStore};
pub use vscode::WorkspaceFile;
pub use workspace::Workspace;
