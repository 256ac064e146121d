//! Git backend error types

use crate::error::{ErrorCode, FaError};

/// Error types for git operations
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Unexpected git output: {0}")]
    Parse(String),
}

pub type GitResult<T> = Result<T, GitError>;

impl GitError {
    pub fn failed(args: &[&str], stderr: &[u8]) -> Self {
        GitError::CommandFailed {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}

impl From<GitError> for FaError {
    fn from(e: GitError) -> Self {
        match e {
            GitError::Spawn(io) => FaError::new(ErrorCode::Git, "Failed to run git")
                .with_remediation("Make sure git is installed and on PATH")
                .with_source(io),
            other => FaError::new(ErrorCode::Git, other.to_string())
                .with_remediation("Inspect the repository with git directly"),
        }
    }
}
