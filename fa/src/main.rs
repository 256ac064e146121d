//! fa - multi-repository worktree workspace manager
//!
//! CLI entry point: logging setup, workspace resolution and command handlers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, bail, eyre};
use serde::Serialize;
use tracing::{debug, info};

use foundagent::cli::{Cli, Command, WtCommand, get_log_path};
use foundagent::config::{Config, RepoDecl};
use foundagent::doctor::{self, CheckStatus, Doctor, DoctorContext, Fixer};
use foundagent::error::FaError;
use foundagent::git::{GitBackend, GitCli};
use foundagent::ops::{
    CloneEngine, CloneStatus, CommitEngine, CommitOptions, CommitStatus, FetchStatus, PullStatus, PushEngine,
    PushOptions, PushStatus, SyncEngine, SyncOptions, WorktreeEngine, WorktreeOptions, WorktreeStatus,
    list_worktrees,
};
use foundagent::reconcile::reconcile;
use foundagent::remove::{RemoveOptions, remove_repo};
use foundagent::state::{Repository, State, StateStore};
use foundagent::workspace::{CONFIG_FILE, Workspace};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Turn a library error into a report that keeps its code and remediation
fn report(e: FaError) -> eyre::Report {
    match e.remediation() {
        Some(hint) => eyre!("{} [{}]\n  hint: {}", e.chain_message(), e.code(), hint),
        None => eyre!("{} [{}]", e.chain_message(), e.code()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn backend() -> Arc<dyn GitBackend> {
    Arc::new(GitCli::new())
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to read current directory")
}

/// `--workspace` names the root exactly; otherwise walk up from the current directory
fn open_workspace(explicit: Option<&Path>) -> Result<Workspace> {
    debug!(?explicit, "open_workspace: called");
    match explicit {
        Some(root) => Workspace::open(root).map_err(report),
        None => Workspace::discover(&current_dir()?).map_err(report),
    }
}

fn load_state(ws: &Workspace) -> Result<State> {
    StateStore::new(ws).load().map_err(report)
}

/// Explicit `--branch`, else the worktree the user is standing in, else the recorded current branch
fn resolve_branch(ws: &Workspace, state: &State, explicit: Option<String>) -> Result<String> {
    debug!(?explicit, "resolve_branch: called");
    if let Some(branch) = explicit {
        return Ok(branch);
    }
    if let Some((repo, branch)) = state.locate(ws, &current_dir()?) {
        debug!(%repo, %branch, "resolve_branch: inside worktree");
        return Ok(branch);
    }
    if let Some(branch) = &state.current_branch {
        return Ok(branch.clone());
    }
    bail!("Cannot tell which branch to use: run from inside a worktree or pass --branch")
}

fn fail_on(failed: usize, total: usize) -> Result<()> {
    if failed > 0 {
        bail!("{} of {} repositories failed", failed, total);
    }
    Ok(())
}

fn ok_mark() -> colored::ColoredString {
    "✓".green()
}

fn skip_mark() -> colored::ColoredString {
    "-".dimmed()
}

fn fail_mark() -> colored::ColoredString {
    "✗".red()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from the workspace config early (before the workspace is opened)
    let config_log_level = cli
        .workspace
        .clone()
        .or_else(|| {
            std::env::current_dir()
                .ok()
                .and_then(|cwd| Workspace::discover(&cwd).ok())
                .map(|ws| ws.root().to_path_buf())
        })
        .and_then(|root| Config::load_log_level(&root.join(CONFIG_FILE)));

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let json = cli.json;
    let workspace = cli.workspace;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Init { dir, name, force } => {
            debug!(?dir, ?name, force, "main: matched Init command");
            cmd_init(dir.or(workspace), name.as_deref(), force, json)
        }
        Command::Add { urls, name } => {
            debug!(?urls, ?name, "main: matched Add command");
            let ws = open_workspace(workspace.as_deref())?;
            cmd_add(&ws, &urls, name.as_deref(), json).await
        }
        Command::List => {
            debug!("main: matched List command");
            let ws = open_workspace(workspace.as_deref())?;
            cmd_list(&ws, json)
        }
        Command::Wt { command } => {
            let ws = open_workspace(workspace.as_deref())?;
            match command {
                WtCommand::Create { branch, from, repos } => {
                    debug!(%branch, ?from, ?repos, "main: matched WtCommand::Create");
                    cmd_wt_create(&ws, branch, from, repos, json).await
                }
                WtCommand::List => {
                    debug!("main: matched WtCommand::List");
                    cmd_wt_list(&ws, json)
                }
            }
        }
        Command::Commit {
            message,
            all,
            amend,
            dry_run,
            allow_detached,
            branch,
            repos,
        } => {
            debug!(all, amend, dry_run, allow_detached, ?branch, ?repos, "main: matched Commit command");
            let ws = open_workspace(workspace.as_deref())?;
            let opts = CommitOptions {
                message,
                all,
                amend,
                dry_run,
                allow_detached,
                repos,
            };
            cmd_commit(&ws, branch, &opts, json).await
        }
        Command::Push { dry_run, branch, repos } => {
            debug!(dry_run, ?branch, ?repos, "main: matched Push command");
            let ws = open_workspace(workspace.as_deref())?;
            cmd_push(&ws, branch, &PushOptions { dry_run, repos }, json).await
        }
        Command::Sync {
            pull,
            stash,
            branch,
            repos,
        } => {
            debug!(pull, stash, ?branch, ?repos, "main: matched Sync command");
            let ws = open_workspace(workspace.as_deref())?;
            cmd_sync(&ws, pull, stash, branch, repos, json).await
        }
        Command::Doctor { fix } => {
            debug!(fix, "main: matched Doctor command");
            let ws = open_workspace(workspace.as_deref())?;
            cmd_doctor(&ws, fix, json)
        }
        Command::Remove {
            name,
            force,
            config_only,
        } => {
            debug!(%name, force, config_only, "main: matched Remove command");
            let ws = open_workspace(workspace.as_deref())?;
            cmd_remove(&ws, &name, RemoveOptions { force, config_only }, json).await
        }
    }
}

/// Create a workspace
fn cmd_init(dir: Option<PathBuf>, name: Option<&str>, force: bool, json: bool) -> Result<()> {
    debug!(?dir, ?name, force, "cmd_init: called");
    let root = match dir {
        Some(dir) => dir,
        None => current_dir()?,
    };
    fs::create_dir_all(&root).with_context(|| format!("Failed to create {}", root.display()))?;
    let ws = Workspace::init(&root, name, force).map_err(report)?;

    if json {
        return print_json(&serde_json::json!({
            "root": ws.root(),
            "name": ws.name(),
            "workspace_file": ws.workspace_file_path(),
        }));
    }
    println!("{} Initialized workspace {} at {}", ok_mark(), ws.name().bold(), ws.root().display());
    println!("  Add repositories with 'fa add <url>'");
    Ok(())
}

/// Declare repositories and clone whatever the config declares but state lacks
async fn cmd_add(ws: &Workspace, urls: &[String], name: Option<&str>, json: bool) -> Result<()> {
    debug!(?urls, ?name, "cmd_add: called");
    if name.is_some() && urls.len() != 1 {
        bail!("--name can only be used with a single URL");
    }

    let mut config = Config::load(&ws.config_path()).map_err(report)?;
    let mut declared = false;
    for url in urls {
        if config.contains_url(url) {
            debug!(%url, "cmd_add: already declared");
            continue;
        }
        let decl = match name {
            Some(name) => RepoDecl::named(url.clone(), name),
            None => RepoDecl::new(url.clone()),
        };
        let added = config.add_repo(decl).map_err(report)?;
        declared = true;
        if !json {
            println!("Declared {}", added.bold());
        }
    }
    if declared {
        config.save(&ws.config_path()).map_err(report)?;
    }

    let state = load_state(ws)?;
    let plan = reconcile(&config.repos, &state);
    if plan.to_clone.is_empty() {
        if json {
            return print_json(&Vec::<()>::new());
        }
        println!("Nothing to clone: every declared repository is present");
        return Ok(());
    }

    let engine = CloneEngine::new(ws.clone(), backend());
    let results = engine
        .run(&plan.to_clone, config.settings.auto_create_worktree)
        .await
        .map_err(report)?;

    if json {
        print_json(&results)?;
    } else {
        for r in &results {
            match r.status {
                CloneStatus::Cloned => {
                    let worktree = r.worktree.as_deref().map(|b| format!(" (worktree {})", b)).unwrap_or_default();
                    println!("  {} {} cloned{}", ok_mark(), r.repo.bold(), worktree);
                    if let Some(e) = &r.error {
                        println!("      {}", e.yellow());
                    }
                }
                CloneStatus::Failed => {
                    println!("  {} {} {}", fail_mark(), r.repo.bold(), r.error.as_deref().unwrap_or("failed").red());
                }
            }
        }
    }
    fail_on(
        results.iter().filter(|r| r.status == CloneStatus::Failed).count(),
        results.len(),
    )
}

#[derive(Serialize)]
struct Listing<'a> {
    repositories: Vec<&'a Repository>,
    not_cloned: Vec<String>,
    not_configured: Vec<String>,
    current_branch: Option<&'a str>,
}

/// List repositories, their worktrees and config/state drift
fn cmd_list(ws: &Workspace, json: bool) -> Result<()> {
    debug!("cmd_list: called");
    let config = Config::load(&ws.config_path()).map_err(report)?;
    let state = load_state(ws)?;
    let plan = reconcile(&config.repos, &state);

    let listing = Listing {
        repositories: state.repositories.values().collect(),
        not_cloned: plan.to_clone.iter().filter_map(|d| d.name.clone()).collect(),
        not_configured: plan.stale.clone(),
        current_branch: state.current_branch.as_deref(),
    };
    if json {
        return print_json(&listing);
    }

    println!("Workspace {} ({})", ws.name().bold(), ws.root().display());
    if listing.repositories.is_empty() && listing.not_cloned.is_empty() {
        println!("  No repositories. Add one with 'fa add <url>'");
        return Ok(());
    }
    for repo in &listing.repositories {
        let marker = if listing.not_configured.contains(&repo.name) {
            " (not in config)".yellow().to_string()
        } else {
            String::new()
        };
        println!("  {}{}  {}", repo.name.bold(), marker, repo.url.dimmed());
        for branch in &repo.worktrees {
            let current = if listing.current_branch == Some(branch.as_str()) { "*" } else { " " };
            println!("    {} {}", current.green(), branch);
        }
    }
    for name in &listing.not_cloned {
        println!("  {} {}", name.bold(), "(declared, not cloned: run 'fa add')".yellow());
    }
    Ok(())
}

/// Create a branch worktree in every repository
async fn cmd_wt_create(
    ws: &Workspace,
    branch: String,
    from: Option<String>,
    repos: Vec<String>,
    json: bool,
) -> Result<()> {
    debug!(%branch, ?from, ?repos, "cmd_wt_create: called");
    let state = load_state(ws)?;
    let opts = WorktreeOptions { branch, from, repos };
    let results = WorktreeEngine::new(ws.clone(), backend())
        .run(&state, &opts)
        .await
        .map_err(report)?;

    if json {
        print_json(&results)?;
    } else {
        for r in &results {
            match r.status {
                WorktreeStatus::Created => {
                    let base = r.base.as_deref().map(|b| format!(" from {}", b)).unwrap_or_default();
                    println!("  {} {} created {}{}", ok_mark(), r.repo.bold(), r.branch, base);
                }
                WorktreeStatus::Exists => println!("  {} {} already has {}", skip_mark(), r.repo.bold(), r.branch),
                WorktreeStatus::Failed => {
                    println!("  {} {} {}", fail_mark(), r.repo.bold(), r.error.as_deref().unwrap_or("failed").red())
                }
            }
        }
    }
    fail_on(
        results.iter().filter(|r| r.status == WorktreeStatus::Failed).count(),
        results.len(),
    )
}

fn cmd_wt_list(ws: &Workspace, json: bool) -> Result<()> {
    debug!("cmd_wt_list: called");
    let state = load_state(ws)?;
    let entries = list_worktrees(ws, &state);
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No worktrees");
        return Ok(());
    }
    for e in &entries {
        let current = if e.current { "*".green().to_string() } else { " ".to_string() };
        let missing = if e.present { String::new() } else { " (missing)".red().to_string() };
        println!("{} {:<20} {:<24} {}{}", current, e.repo, e.branch, e.path.display(), missing);
    }
    Ok(())
}

/// Commit one branch across repositories
async fn cmd_commit(ws: &Workspace, branch: Option<String>, opts: &CommitOptions, json: bool) -> Result<()> {
    debug!(?branch, dry_run = opts.dry_run, "cmd_commit: called");
    let state = load_state(ws)?;
    let branch = resolve_branch(ws, &state, branch)?;
    let results = CommitEngine::new(ws.clone(), backend())
        .run(&state, &branch, opts)
        .await
        .map_err(report)?;

    if json {
        print_json(&results)?;
    } else {
        println!("Commit on {}", branch.bold());
        for r in &results {
            let stats = format!("{} files, +{} -{}", r.files_changed, r.insertions, r.deletions);
            match r.status {
                CommitStatus::Committed => {
                    let sha = r.commit_sha.as_deref().unwrap_or("");
                    let short = &sha[..sha.len().min(8)];
                    println!("  {} {} committed {} ({})", ok_mark(), r.repo.bold(), short.yellow(), stats);
                }
                CommitStatus::WouldCommit => println!("  {} {} would commit ({})", ok_mark(), r.repo.bold(), stats),
                CommitStatus::Skipped => println!(
                    "  {} {} skipped: {}",
                    skip_mark(),
                    r.repo.bold(),
                    r.error.as_deref().unwrap_or("")
                ),
                CommitStatus::Failed => println!(
                    "  {} {} {}",
                    fail_mark(),
                    r.repo.bold(),
                    r.error.as_deref().unwrap_or("failed").red()
                ),
            }
        }
    }
    fail_on(
        results.iter().filter(|r| r.status == CommitStatus::Failed).count(),
        results.len(),
    )
}

/// Push one branch across repositories
async fn cmd_push(ws: &Workspace, branch: Option<String>, opts: &PushOptions, json: bool) -> Result<()> {
    debug!(?branch, dry_run = opts.dry_run, "cmd_push: called");
    let state = load_state(ws)?;
    let branch = resolve_branch(ws, &state, branch)?;
    let results = PushEngine::new(ws.clone(), backend())
        .run(&state, &branch, opts)
        .await
        .map_err(report)?;

    if json {
        print_json(&results)?;
    } else {
        println!("Push {}", branch.bold());
        for r in &results {
            let target = r.target.as_deref().unwrap_or("");
            match r.status {
                PushStatus::Pushed => println!(
                    "  {} {} pushed {} commit(s) to {}",
                    ok_mark(),
                    r.repo.bold(),
                    r.commits_ahead,
                    target
                ),
                PushStatus::WouldPush => println!(
                    "  {} {} would push {} commit(s) to {}",
                    ok_mark(),
                    r.repo.bold(),
                    r.commits_ahead,
                    target
                ),
                PushStatus::Skipped => println!(
                    "  {} {} skipped: {}",
                    skip_mark(),
                    r.repo.bold(),
                    r.error.as_deref().unwrap_or("")
                ),
                PushStatus::Failed => println!(
                    "  {} {} {}",
                    fail_mark(),
                    r.repo.bold(),
                    r.error.as_deref().unwrap_or("failed").red()
                ),
            }
        }
    }
    fail_on(
        results.iter().filter(|r| r.status == PushStatus::Failed).count(),
        results.len(),
    )
}

/// Fetch everything, optionally pull one branch
async fn cmd_sync(
    ws: &Workspace,
    pull: bool,
    stash: bool,
    branch: Option<String>,
    repos: Vec<String>,
    json: bool,
) -> Result<()> {
    debug!(pull, stash, ?branch, "cmd_sync: called");
    let state = load_state(ws)?;
    let branch = if pull {
        Some(resolve_branch(ws, &state, branch)?)
    } else {
        branch
    };
    let opts = SyncOptions {
        repos,
        pull,
        branch,
        stash,
    };
    let outcome = SyncEngine::new(ws.clone(), backend())
        .run(&state, &opts)
        .await
        .map_err(report)?;

    if json {
        print_json(&outcome)?;
    } else {
        println!("Fetch");
        for f in &outcome.fetch {
            match f.status {
                FetchStatus::Fetched => println!("  {} {}", ok_mark(), f.repo.bold()),
                FetchStatus::Failed => println!(
                    "  {} {} {}",
                    fail_mark(),
                    f.repo.bold(),
                    f.error.as_deref().unwrap_or("failed").red()
                ),
            }
        }
        if let Some(branch) = opts.branch.as_deref().filter(|_| pull) {
            println!("Pull {}", branch.bold());
            for p in &outcome.pull {
                let detail = p.error.as_deref().unwrap_or("");
                match p.status {
                    PullStatus::Pulled => {
                        let note = if p.stashed { " (local changes restored)" } else { "" };
                        println!("  {} {} pulled{}", ok_mark(), p.repo.bold(), note);
                    }
                    PullStatus::Skipped => println!("  {} {} skipped: {}", skip_mark(), p.repo.bold(), detail),
                    PullStatus::Failed | PullStatus::StashRetained | PullStatus::RestoreFailed => {
                        println!("  {} {} {}", fail_mark(), p.repo.bold(), detail.red())
                    }
                }
            }
        }
    }

    if outcome.has_failures() {
        let failed = outcome.fetch.iter().filter(|f| f.status == FetchStatus::Failed).count()
            + outcome
                .pull
                .iter()
                .filter(|p| !matches!(p.status, PullStatus::Pulled | PullStatus::Skipped))
                .count();
        bail!("{} repository operation(s) failed", failed);
    }
    Ok(())
}

/// Run every check, optionally repairing as it goes
fn cmd_doctor(ws: &Workspace, fix: bool, json: bool) -> Result<()> {
    debug!(fix, "cmd_doctor: called");
    let ctx = DoctorContext::new(ws.clone());
    let results = if fix {
        Fixer::standard().run_and_fix(&ctx)
    } else {
        Doctor::standard().run(&ctx)
    };

    if json {
        print_json(&results)?;
    } else {
        for r in &results {
            let mark = match r.status {
                CheckStatus::Pass => ok_mark(),
                CheckStatus::Warn => "!".yellow(),
                CheckStatus::Fail => fail_mark(),
            };
            let fixable = if r.fixable && !fix { " (fixable)".dimmed().to_string() } else { String::new() };
            println!("  {} {:<20} {}{}", mark, r.name, r.message, fixable);
            if !r.is_pass() {
                if let Some(hint) = &r.remediation {
                    println!("      {}", hint.dimmed());
                }
            }
        }
    }

    let failed = results.iter().filter(|r| r.status == CheckStatus::Fail).count();
    if doctor::has_failures(&results) {
        bail!("{} check(s) failed", failed);
    }
    Ok(())
}

/// Remove a repository from config, state and disk
async fn cmd_remove(ws: &Workspace, name: &str, opts: RemoveOptions, json: bool) -> Result<()> {
    debug!(%name, ?opts, "cmd_remove: called");
    let git = GitCli::new();
    let result = remove_repo(ws, &git, name, opts, &current_dir()?)
        .await
        .map_err(report)?;

    if json {
        print_json(&result)?;
    } else {
        let step = |done: bool, what: &str| {
            if done {
                println!("  {} {}", ok_mark(), what);
            } else {
                println!("  {} {}", skip_mark(), what.dimmed());
            }
        };
        println!("Remove {}", name.bold());
        step(result.removed_from_config, "removed from config");
        step(result.workspace_file_updated, "removed from workspace file");
        if !result.config_only {
            step(
                result.worktrees_deleted > 0,
                &format!("deleted {} worktree(s)", result.worktrees_deleted),
            );
            step(result.bare_clone_deleted, "deleted bare clone");
            step(result.removed_from_state, "removed from state");
        }
    }

    if let Some(e) = &result.error {
        bail!("Removal of {} stopped partway: {}", name, e);
    }
    Ok(())
}
