//! Declared configuration (`.foundagent.yaml`) types and loading

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{ErrorCode, FaError, Result};

/// Declared workspace configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace metadata
    pub workspace: WorkspaceSection,

    /// Repositories the workspace should contain, in declaration order
    pub repos: Vec<RepoDecl>,

    /// Tool settings
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    /// Workspace name, also the stem of the `.code-workspace` file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One declared repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDecl {
    /// Remote location
    pub url: String,

    /// Directory-safe name; inferred from the URL when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Branch checked out when the repository is first cloned
    #[serde(default, rename = "default-branch", skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

impl RepoDecl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            default_branch: None,
        }
    }

    pub fn named(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: Some(name.into()),
            default_branch: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Create a worktree for the default branch right after cloning
    #[serde(rename = "auto-create-worktree")]
    pub auto_create_worktree: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            auto_create_worktree: true,
        }
    }
}

/// Names become directory components under `repos/.bare` and `repos/worktrees`
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Error for a name that cannot be used as a single directory component
pub fn unsafe_name(name: &str, code: ErrorCode) -> FaError {
    FaError::new(code, format!("Repository name '{}' is not a valid directory name", name.escape_debug()))
        .with_remediation("Use a name without '/', '\\', '.' or '..'")
}

/// Infer a repository name from its URL: last path segment without `.git`
pub fn infer_name(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let segment = trimmed.rsplit(['/', ':']).next()?;
    let name = segment.strip_suffix(".git").unwrap_or(segment);
    if !is_safe_name(name) {
        return None;
    }
    Some(name.to_string())
}

impl Config {
    /// Load, infer missing names and validate
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load: called");
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FaError::new(
                    ErrorCode::ConfigNotFound,
                    format!("Config file not found: {}", path.display()),
                )
                .with_remediation("Run 'fa init' to create a workspace"));
            }
            Err(e) => return Err(FaError::io(format!("Failed to read {}", path.display()), e)),
        };

        let mut config: Config = serde_yaml::from_str(&content).map_err(|e| {
            FaError::new(ErrorCode::ConfigInvalid, format!("Failed to parse {}", path.display()))
                .with_remediation("Fix the YAML syntax in the config file")
                .with_source(e)
        })?;

        config.infer_names();
        config.validate()?;
        debug!(repos = config.repos.len(), "Config::load: loaded");
        Ok(config)
    }

    /// Read only the log level, ignoring any error
    pub fn load_log_level(path: &Path) -> Option<String> {
        let content = fs::read_to_string(path).ok()?;
        let config: Config = serde_yaml::from_str(&content).ok()?;
        config.settings.log_level
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "Config::save: called");
        let content = serde_yaml::to_string(self).map_err(|e| {
            FaError::new(ErrorCode::ConfigInvalid, "Failed to serialize config").with_source(e)
        })?;
        fs::write(path, content).map_err(|e| FaError::io(format!("Failed to write {}", path.display()), e))
    }

    /// Fill in names the user left out
    pub fn infer_names(&mut self) {
        for repo in &mut self.repos {
            if repo.name.is_none() {
                repo.name = infer_name(&repo.url);
            }
        }
    }

    /// Reject empty URLs, unsafe names and duplicate names or URLs
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut urls = HashSet::new();
        for repo in &self.repos {
            if repo.url.trim().is_empty() {
                return Err(FaError::new(ErrorCode::ConfigInvalid, "Repository declared with an empty URL")
                    .with_remediation("Give every entry under 'repos' a url"));
            }
            if !urls.insert(repo.url.as_str()) {
                return Err(FaError::new(
                    ErrorCode::DuplicateName,
                    format!("Repository URL declared twice: {}", repo.url),
                )
                .with_remediation("Remove the duplicate entry from .foundagent.yaml"));
            }
            if let Some(name) = &repo.name {
                if !is_safe_name(name) {
                    return Err(unsafe_name(name, ErrorCode::ConfigInvalid));
                }
                if !names.insert(name.as_str()) {
                    return Err(FaError::new(
                        ErrorCode::DuplicateName,
                        format!("Repository name declared twice: {}", name),
                    )
                    .with_remediation("Give one of the repositories an explicit distinct name"));
                }
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&RepoDecl> {
        self.repos.iter().find(|r| r.name.as_deref() == Some(name))
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.repos.iter().any(|r| r.url == url)
    }

    /// Declare a repository, inferring its name when missing
    pub fn add_repo(&mut self, mut decl: RepoDecl) -> Result<String> {
        if decl.name.is_none() {
            decl.name = infer_name(&decl.url);
        }
        let name = decl.name.clone().ok_or_else(|| {
            FaError::new(
                ErrorCode::InvalidArgument,
                format!("Cannot infer a repository name from '{}'", decl.url),
            )
            .with_remediation("Pass --name explicitly")
        })?;
        if !is_safe_name(&name) {
            return Err(unsafe_name(&name, ErrorCode::InvalidArgument));
        }
        if self.find(&name).is_some() || self.contains_url(&decl.url) {
            return Err(FaError::new(
                ErrorCode::DuplicateName,
                format!("Repository '{}' is already declared", name),
            )
            .with_remediation("Choose a different --name or remove the existing entry"));
        }
        self.repos.push(decl);
        Ok(name)
    }

    /// Remove a declaration by name; returns whether one was removed
    pub fn remove_repo(&mut self, name: &str) -> bool {
        let before = self.repos.len();
        self.repos.retain(|r| r.name.as_deref() != Some(name));
        before != self.repos.len()
    }
}
