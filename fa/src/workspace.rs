//! Workspace layout: where the config, state, bare stores and worktrees live
//!
//! ```text
//! <root>/
//! ├── .foundagent.yaml
//! ├── .foundagent/state.json
//! ├── <name>.code-workspace
//! └── repos/
//!     ├── .bare/<repo>.git
//!     └── worktrees/<repo>/<branch>
//! ```

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ErrorCode, FaError, Result};
use crate::state::StateStore;
use crate::vscode::WorkspaceFile;

pub const CONFIG_FILE: &str = ".foundagent.yaml";
pub const FOUNDAGENT_DIR: &str = ".foundagent";
pub const STATE_FILE: &str = "state.json";
pub const STATE_LOCK_FILE: &str = "state.lock";
pub const REPOS_DIR: &str = "repos";
pub const BARE_DIR: &str = ".bare";
pub const WORKTREES_DIR: &str = "worktrees";
pub const WORKSPACE_FILE_EXT: &str = "code-workspace";

/// Resolved paths of one workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    name: String,
}

impl Workspace {
    /// Workspace rooted at `root`; the name defaults to the directory name
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        Self { root, name }
    }

    pub fn with_name(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    /// Walk up from `start` until a directory holding `.foundagent.yaml` is found
    pub fn discover(start: &Path) -> Result<Self> {
        debug!(start = %start.display(), "Workspace::discover: called");
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(CONFIG_FILE).is_file() {
                debug!(root = %dir.display(), "Workspace::discover: found workspace root");
                return Self::open(dir);
            }
            current = dir.parent();
        }
        Err(FaError::new(
            ErrorCode::WorkspaceNotFound,
            format!("No foundagent workspace found at or above {}", start.display()),
        )
        .with_remediation("Run 'fa init' to create a workspace"))
    }

    /// Open a workspace whose root is known, taking its name from the config when readable
    pub fn open(root: &Path) -> Result<Self> {
        debug!(root = %root.display(), "Workspace::open: called");
        let mut ws = Self::new(root);
        if let Some(name) = Config::load(&ws.config_path()).ok().and_then(|c| c.workspace.name) {
            ws.name = name;
        }
        Ok(ws)
    }

    /// Create the workspace layout, an empty state document and a workspace file
    pub fn init(root: &Path, name: Option<&str>, force: bool) -> Result<Self> {
        debug!(root = %root.display(), ?name, force, "Workspace::init: called");
        let ws = match name {
            Some(name) => Self::with_name(root, name),
            None => Self::new(root),
        };

        if ws.config_path().exists() && !force {
            return Err(FaError::new(
                ErrorCode::WorkspaceExists,
                format!("Workspace already initialized at {}", root.display()),
            )
            .with_remediation("Use --force to reinitialize"));
        }

        for dir in [ws.foundagent_dir(), ws.bare_dir(), ws.worktrees_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| FaError::io(format!("Failed to create {}", dir.display()), e))?;
        }

        let mut config = Config::default();
        config.workspace.name = Some(ws.name.clone());
        config.save(&ws.config_path())?;

        StateStore::new(&ws).init()?;

        let mut file = WorkspaceFile::default();
        file.ensure_root_folder();
        file.save(&ws.workspace_file_path())?;

        info!("Initialized workspace '{}' at {}", ws.name, root.display());
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn foundagent_dir(&self) -> PathBuf {
        self.root.join(FOUNDAGENT_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.foundagent_dir().join(STATE_FILE)
    }

    pub fn state_lock_path(&self) -> PathBuf {
        self.foundagent_dir().join(STATE_LOCK_FILE)
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.root.join(REPOS_DIR)
    }

    pub fn bare_dir(&self) -> PathBuf {
        self.repos_dir().join(BARE_DIR)
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.repos_dir().join(WORKTREES_DIR)
    }

    pub fn workspace_file_path(&self) -> PathBuf {
        self.root.join(format!("{}.{}", self.name, WORKSPACE_FILE_EXT))
    }

    /// Bare store of a repository
    pub fn bare_repo_path(&self, repo: &str) -> PathBuf {
        self.bare_dir().join(format!("{}.git", repo))
    }

    /// Directory holding every worktree of a repository
    pub fn repo_worktrees_dir(&self, repo: &str) -> PathBuf {
        self.worktrees_dir().join(repo)
    }

    pub fn worktree_path(&self, repo: &str, branch: &str) -> PathBuf {
        self.repo_worktrees_dir(repo).join(branch)
    }

    /// Worktree path relative to the root, as recorded in the workspace file
    pub fn worktree_folder_ref(&self, repo: &str, branch: &str) -> String {
        format!("{}/{}/{}/{}", REPOS_DIR, WORKTREES_DIR, repo, branch)
    }
}
