//! Workspace fixture backed by the fake git backend

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::git::GitBackend;
use crate::git::fake::{FakeGit, FakeRepo};
use crate::state::{Repository, State, StateStore};
use crate::workspace::Workspace;

pub struct Fixture {
    pub temp: TempDir,
    pub ws: Workspace,
    pub state: State,
    pub git: Arc<FakeGit>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let ws = Workspace::with_name(temp.path(), "demo");
        std::fs::create_dir_all(ws.bare_dir()).unwrap();
        std::fs::create_dir_all(ws.worktrees_dir()).unwrap();
        std::fs::create_dir_all(ws.foundagent_dir()).unwrap();
        Self {
            temp,
            ws,
            state: State::default(),
            git: Arc::new(FakeGit::new()),
        }
    }

    pub fn backend(&self) -> Arc<dyn GitBackend> {
        self.git.clone()
    }

    /// State entry plus a bare store on disk and in the fake
    pub fn add_repo(&mut self, name: &str) -> PathBuf {
        let bare = self.ws.bare_repo_path(name);
        std::fs::create_dir_all(bare.join("objects")).unwrap();
        self.git.insert(&bare, FakeRepo::on_branch("main"));
        self.state
            .add_repository(Repository::new(name, format!("git@example.com:org/{}.git", name)));
        bare
    }

    /// Write the in-memory state to disk for engines that persist
    pub fn persist(&self) -> StateStore {
        let store = StateStore::new(&self.ws);
        store.save(&self.state).unwrap();
        store
    }

    /// Worktree directory, state entry and simulated repository
    pub fn add_worktree(&mut self, name: &str, branch: &str, repo: FakeRepo) -> PathBuf {
        if !self.state.contains(name) {
            self.add_repo(name);
        }
        let path = self.ws.worktree_path(name, branch);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(".git"), "gitdir: fake\n").unwrap();
        self.git.insert(&path, repo);
        self.state.add_worktree(name, branch);
        path
    }
}
