//! Workspace diagnostics
//!
//! A [`Check`] reads the config, the state document and the filesystem and
//! reports pass/warn/fail. Checks never mutate anything; repairs live in the
//! [`Fixer`], keyed by check name.

mod checks;
mod fixer;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::state::{State, StateStore};
use crate::workspace::Workspace;

pub use checks::{
    ConfigCheck, ConsistencyCheck, OrphanedReposCheck, OrphanedWorktreesCheck, RepositoriesCheck, StateCheck,
    StructureCheck, WorkspaceFileCheck, WorktreesCheck, orphaned_repos, orphaned_worktrees,
};
pub use fixer::{FixFn, Fixer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// `doctor --fix` has a routine for this result
    pub fixable: bool,
}

impl CheckResult {
    pub fn pass(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass, message)
    }

    pub fn warn(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, message)
    }

    pub fn fail(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, message)
    }

    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            remediation: None,
            fixable: false,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn fixable(mut self) -> Self {
        self.fixable = true;
        self
    }

    pub fn is_pass(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

/// What every check gets to look at
#[derive(Debug, Clone)]
pub struct DoctorContext {
    pub ws: Workspace,
}

impl DoctorContext {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }

    /// Fresh read of the declared configuration
    pub fn config(&self) -> Result<Config> {
        Config::load(&self.ws.config_path())
    }

    /// Fresh read of the state document
    pub fn state(&self) -> Result<State> {
        StateStore::new(&self.ws).load()
    }
}

/// A read-only diagnostic
pub trait Check: Send + Sync {
    /// Identity string, also the fixer key
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &DoctorContext) -> CheckResult;
}

/// Ordered check registry
pub struct Doctor {
    checks: Vec<Box<dyn Check>>,
}

impl Doctor {
    /// Every built-in check, structure first
    pub fn standard() -> Self {
        let checks: Vec<Box<dyn Check>> = vec![
            Box::new(StructureCheck),
            Box::new(ConfigCheck),
            Box::new(StateCheck),
            Box::new(RepositoriesCheck),
            Box::new(OrphanedReposCheck),
            Box::new(OrphanedWorktreesCheck),
            Box::new(WorktreesCheck),
            Box::new(ConsistencyCheck),
            Box::new(WorkspaceFileCheck),
        ];
        Self { checks }
    }

    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn add_check(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    pub fn check(&self, name: &str) -> Option<&dyn Check> {
        self.checks.iter().find(|c| c.name() == name).map(|c| &**c)
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn run(&self, ctx: &DoctorContext) -> Vec<CheckResult> {
        debug!(checks = self.checks.len(), "Doctor::run: called");
        self.checks.iter().map(|c| c.run(ctx)).collect()
    }

    pub fn run_one(&self, name: &str, ctx: &DoctorContext) -> Option<CheckResult> {
        self.check(name).map(|c| c.run(ctx))
    }
}

impl Default for Doctor {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn has_failures(results: &[CheckResult]) -> bool {
    results.iter().any(|r| r.status == CheckStatus::Fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(CheckStatus);

    impl Check for Always {
        fn name(&self) -> &'static str {
            "always"
        }

        fn run(&self, _ctx: &DoctorContext) -> CheckResult {
            CheckResult::new("always", self.0, "fixed verdict")
        }
    }

    #[test]
    fn test_standard_registry_order() {
        assert_eq!(
            Doctor::standard().check_names(),
            vec![
                "structure",
                "config",
                "state",
                "repositories",
                "orphaned-repos",
                "orphaned-worktrees",
                "worktrees",
                "consistency",
                "workspace-file"
            ]
        );
    }

    #[test]
    fn test_custom_check() {
        let mut doctor = Doctor::empty();
        doctor.add_check(Box::new(Always(CheckStatus::Fail)));
        let ctx = DoctorContext::new(Workspace::with_name("/nowhere", "demo"));

        let results = doctor.run(&ctx);
        assert_eq!(results.len(), 1);
        assert!(has_failures(&results));
        assert!(doctor.run_one("missing", &ctx).is_none());
    }

    #[test]
    fn test_result_serializes_lowercase_status() {
        let result = CheckResult::warn("state", "odd").fixable();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "warn");
        assert_eq!(json["fixable"], true);
        assert!(json.get("remediation").is_none());
    }
}
