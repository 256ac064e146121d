//! Error types shared by every foundagent component

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Boxed underlying cause carried by an [`FaError`]
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the library
pub type Result<T, E = FaError> = std::result::Result<T, E>;

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// No `.foundagent.yaml` found walking up from the start directory
    WorkspaceNotFound,
    /// Workspace already initialized at the target directory
    WorkspaceExists,
    /// Declared configuration file is missing
    ConfigNotFound,
    /// Declared configuration file could not be parsed or failed validation
    ConfigInvalid,
    /// State document is missing (workspace never initialized)
    StateNotFound,
    /// State document exists but cannot be parsed
    StateCorrupt,
    /// Workspace-folder-list document could not be read or written
    WorkspaceFileInvalid,
    /// Filesystem operation failed (permissions, missing directories)
    Filesystem,
    /// Git backend call failed
    Git,
    /// Named repository is not known to the workspace
    RepoNotFound,
    /// Repository name is already declared or materialized
    DuplicateName,
    /// Worktree has uncommitted changes
    DirtyWorktree,
    /// The caller's working directory is inside the removal target
    CwdInsideTarget,
    /// Worktree is on a detached HEAD
    DetachedHead,
    /// Parallel task panicked or was cancelled
    TaskPanicked,
    /// Caller supplied an argument that cannot be acted upon
    InvalidArgument,
}

impl ErrorCode {
    /// Kebab-case string form, stable for JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::WorkspaceNotFound => "workspace-not-found",
            ErrorCode::WorkspaceExists => "workspace-exists",
            ErrorCode::ConfigNotFound => "config-not-found",
            ErrorCode::ConfigInvalid => "config-invalid",
            ErrorCode::StateNotFound => "state-not-found",
            ErrorCode::StateCorrupt => "state-corrupt",
            ErrorCode::WorkspaceFileInvalid => "workspace-file-invalid",
            ErrorCode::Filesystem => "filesystem",
            ErrorCode::Git => "git",
            ErrorCode::RepoNotFound => "repo-not-found",
            ErrorCode::DuplicateName => "duplicate-name",
            ErrorCode::DirtyWorktree => "dirty-worktree",
            ErrorCode::CwdInsideTarget => "cwd-inside-target",
            ErrorCode::DetachedHead => "detached-head",
            ErrorCode::TaskPanicked => "task-panicked",
            ErrorCode::InvalidArgument => "invalid-argument",
        }
    }

    /// Guard violations block an operation before any mutation happens
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            ErrorCode::DirtyWorktree | ErrorCode::CwdInsideTarget | ErrorCode::DuplicateName
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged error: code, human message, remediation text and an optional cause
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FaError {
    code: ErrorCode,
    message: String,
    remediation: Option<String>,
    #[source]
    source: Option<BoxedCause>,
}

impl FaError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            remediation: None,
            source: None,
        }
    }

    /// Attach remediation text shown to the user
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Into<BoxedCause>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn remediation(&self) -> Option<&str> {
        self.remediation.as_deref()
    }

    /// Message followed by every cause in the chain, `: `-separated
    pub fn chain_message(&self) -> String {
        let mut out = self.message.clone();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }

    pub fn repo_not_found(name: &str) -> Self {
        Self::new(ErrorCode::RepoNotFound, format!("Repository '{}' not found in workspace", name))
            .with_remediation("Run 'fa list' to see repositories in this workspace")
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        let remediation = match source.kind() {
            std::io::ErrorKind::PermissionDenied => "Check file permissions on the workspace directory",
            std::io::ErrorKind::NotFound => "Run 'fa doctor' to check the workspace structure",
            _ => "Check the workspace directory and try again",
        };
        Self::new(ErrorCode::Filesystem, message)
            .with_remediation(remediation)
            .with_source(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_chain_message_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = FaError::io("Failed to write state", io);

        assert_eq!(err.code(), ErrorCode::Filesystem);
        assert_eq!(err.to_string(), "Failed to write state");
        assert_eq!(err.chain_message(), "Failed to write state: denied");
        assert!(err.source().is_some());
        assert!(err.remediation().unwrap().contains("permissions"));
    }

    #[test]
    fn test_repo_not_found_message() {
        let err = FaError::repo_not_found("api");

        let msg = err.to_string();
        assert!(msg.contains("api"));
        assert_eq!(err.code(), ErrorCode::RepoNotFound);
        assert!(err.remediation().is_some());
    }

    #[test]
    fn test_guard_violation_codes() {
        assert!(ErrorCode::DirtyWorktree.is_guard_violation());
        assert!(ErrorCode::CwdInsideTarget.is_guard_violation());
        assert!(!ErrorCode::Git.is_guard_violation());
        assert_eq!(ErrorCode::StateCorrupt.to_string(), "state-corrupt");
    }
}
