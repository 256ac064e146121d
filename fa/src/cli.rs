//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// foundagent - multi-repository worktree workspace manager
#[derive(Parser)]
#[command(
    name = "fa",
    about = "Manage several repositories as bare clones with one worktree per branch",
    version
)]
pub struct Cli {
    /// Workspace root (defaults to the nearest directory holding .foundagent.yaml)
    #[arg(short = 'w', long, global = true, help = "Workspace root directory")]
    pub workspace: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new workspace
    Init {
        /// Directory to initialize (defaults to the current directory)
        dir: Option<PathBuf>,

        /// Workspace name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Reinitialize an existing workspace
        #[arg(short, long)]
        force: bool,
    },

    /// Declare repositories and clone everything not yet cloned
    Add {
        /// Repository URLs to declare; without any, clone what the config already declares
        urls: Vec<String>,

        /// Name for the repository (only with a single URL)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List repositories and their worktrees
    List,

    /// Manage worktrees across repositories
    Wt {
        #[command(subcommand)]
        command: WtCommand,
    },

    /// Commit the current branch in every repository
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Stage modifications to tracked files first
        #[arg(short, long)]
        all: bool,

        /// Amend the previous commit
        #[arg(long)]
        amend: bool,

        /// Report what would be committed without committing
        #[arg(long)]
        dry_run: bool,

        /// Commit even when HEAD is detached
        #[arg(long)]
        allow_detached: bool,

        /// Branch to commit (defaults to the worktree you are in)
        #[arg(short, long)]
        branch: Option<String>,

        /// Only these repositories
        #[arg(short, long = "repo", value_name = "REPO")]
        repos: Vec<String>,
    },

    /// Push the current branch in every repository
    Push {
        /// Report what would be pushed without pushing
        #[arg(long)]
        dry_run: bool,

        /// Branch to push (defaults to the worktree you are in)
        #[arg(short, long)]
        branch: Option<String>,

        /// Only these repositories
        #[arg(short, long = "repo", value_name = "REPO")]
        repos: Vec<String>,
    },

    /// Fetch every repository, optionally pulling one branch
    Sync {
        /// Pull the branch after fetching
        #[arg(short, long)]
        pull: bool,

        /// Stash local changes around the pull
        #[arg(short, long)]
        stash: bool,

        /// Branch to pull (defaults to the worktree you are in)
        #[arg(short, long)]
        branch: Option<String>,

        /// Only these repositories
        #[arg(short, long = "repo", value_name = "REPO")]
        repos: Vec<String>,
    },

    /// Check workspace consistency
    Doctor {
        /// Repair what can be repaired
        #[arg(long)]
        fix: bool,
    },

    /// Remove a repository from the workspace
    Remove {
        /// Repository name
        name: String,

        /// Remove even when worktrees have uncommitted changes
        #[arg(short, long)]
        force: bool,

        /// Only remove the config entry and workspace-file folders
        #[arg(long)]
        config_only: bool,
    },
}

/// Worktree subcommands
#[derive(Debug, Subcommand)]
pub enum WtCommand {
    /// Create a branch worktree in every repository
    Create {
        /// Branch name
        branch: String,

        /// Start point for a new branch (defaults to each repository's default branch)
        #[arg(short, long, value_name = "BASE")]
        from: Option<String>,

        /// Only these repositories
        #[arg(short, long = "repo", value_name = "REPO")]
        repos: Vec<String>,
    },

    /// List every worktree
    List,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("foundagent")
        .join("logs")
        .join("fa.log");
    debug!(?path, "get_log_path: returning path");
    path
}
