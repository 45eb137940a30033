//! Version control for the annotation repository
//!
//! [`VersionControl`] is everything the store needs from a VCS: bind to a
//! repository root, commit (and push when a remote exists), pull, and tell
//! who the current author is. [`GitAdapter`] implements it by running the
//! `git` executable.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;

use crate::error::{Result, StoreError, SyncOperation};

/// README written at the root of a freshly created annotation repository
pub const README: &str = "\
# Code Annotations

This repository is managed by codenotes. It stores line annotations for
source files without touching the sources themselves.

## Layout

Each project gets one directory, named after the project folder plus the
first 16 hex characters of the SHA-256 digest of its normalized absolute
path:

    <project-basename>_<digest>/annotations.json

## Document format

    {
      \"version\": \"1.0\",
      \"annotations\": [
        {
          \"id\": \"unique id\",
          \"filePath\": \"path/relative/to/project\",
          \"line\": 42,
          \"column\": 0,
          \"text\": \"note text\",
          \"author\": \"Display Name\",
          \"timestamp\": 1234567890000,
          \"projectPath\": \"/absolute/path/to/project\"
        }
      ]
    }

Every change is committed with a message describing who annotated what.
Edit the JSON by hand only if you know what you are doing.
";

const README_FILE: &str = "README.md";
const INITIAL_COMMIT_MESSAGE: &str = "Initialize annotation repository";

/// Name used when git has no `user.name`
pub const FALLBACK_NAME: &str = "Unknown";
/// Email used when git has no `user.email`
pub const FALLBACK_EMAIL: &str = "unknown@example.com";

/// Author identity taken from the VCS configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn fallback() -> Self {
        Self {
            name: FALLBACK_NAME.to_string(),
            email: FALLBACK_EMAIL.to_string(),
        }
    }
}

/// Some identity fields could not be read and fell back to defaults
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("git identity is incomplete (missing {}), using fallback values", .missing.join(", "))]
pub struct IdentityWarning {
    pub missing: Vec<String>,
}

/// Identity lookup result. Always usable, possibly with a warning attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    pub warning: Option<IdentityWarning>,
}

/// What `commit_and_maybe_push` ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was staged, so no commit was created
    NothingToCommit,
    /// A commit was created, and pushed if a remote is configured
    Committed { pushed_to: Option<String> },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// What `pull` ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Local-only repository, nothing to pull from
    NoRemote,
    Pulled { remote: String },
}

/// Version-control operations needed by the annotation store.
///
/// Calls are awaited one at a time by a single owner; implementations do
/// not need to be safe against overlapping calls.
#[allow(async_fn_in_trait)]
pub trait VersionControl {
    /// Root the adapter is bound to, `None` before `initialize`
    fn repo_root(&self) -> Option<&Path>;

    /// Create (if needed) and bind to the repository at `repo_root`
    async fn initialize(&mut self, repo_root: &Path) -> Result<()>;

    /// Configured author. Never fails; falls back with a warning.
    async fn identity(&self) -> ResolvedIdentity;

    /// Stage everything and commit; push when a remote exists
    async fn commit_and_maybe_push(&self, message: &str) -> Result<CommitOutcome>;

    /// Pull from the default remote, no-op without one
    async fn pull(&self) -> Result<PullOutcome>;

    /// Names of configured remotes
    async fn remotes(&self) -> Result<Vec<String>>;
}

/// [`VersionControl`] backed by the `git` command line
#[derive(Debug, Clone)]
pub struct GitAdapter {
    program: PathBuf,
    preferred_remote: String,
    repo_root: Option<PathBuf>,
}

impl GitAdapter {
    /// Adapter running `git` from `PATH`, preferring the `origin` remote
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            preferred_remote: "origin".to_string(),
            repo_root: None,
        }
    }

    /// Use a specific git executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Remote to push to and pull from when several are configured
    pub fn with_preferred_remote(mut self, remote: impl Into<String>) -> Self {
        self.preferred_remote = remote.into();
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.repo_root.is_some()
    }

    fn bound_root(&self) -> Result<&Path> {
        self.repo_root
            .as_deref()
            .ok_or(StoreError::RepositoryNotInitialized)
    }

    /// Run git and return its stdout, or a description of the failure
    async fn run(
        &self,
        dir: Option<&Path>,
        args: &[&str],
        author: Option<&Identity>,
    ) -> std::result::Result<String, String> {
        log::debug!("git {}", args.join(" "));

        let mut cmd = Command::new(&self.program);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.args(args);
        // Never block on a credential prompt; there is no terminal.
        cmd.env("GIT_TERMINAL_PROMPT", "0");

        if let Some(author) = author {
            cmd.env("GIT_AUTHOR_NAME", &author.name)
                .env("GIT_AUTHOR_EMAIL", &author.email)
                .env("GIT_COMMITTER_NAME", &author.name)
                .env("GIT_COMMITTER_EMAIL", &author.email);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.program.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return Err(format!("{} ({})", detail, output.status));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn config_value(&self, dir: Option<&Path>, key: &str) -> Option<String> {
        match self.run(dir, &["config", "--get", key], None).await {
            Ok(value) => {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            }
            Err(_) => None,
        }
    }

    async fn default_remote(&self, root: &Path) -> Result<Option<String>> {
        let remotes = self.list_remotes(root).await?;
        if remotes.iter().any(|r| *r == self.preferred_remote) {
            return Ok(Some(self.preferred_remote.clone()));
        }
        Ok(remotes.into_iter().next())
    }

    async fn list_remotes(&self, root: &Path) -> Result<Vec<String>> {
        let stdout = self
            .run(Some(root), &["remote"], None)
            .await
            .map_err(|e| StoreError::vcs("remote", e))?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn current_branch(&self, root: &Path) -> Result<String> {
        let stdout = self
            .run(Some(root), &["rev-parse", "--abbrev-ref", "HEAD"], None)
            .await
            .map_err(|e| StoreError::vcs("rev-parse", e))?;
        Ok(stdout.trim().to_string())
    }

    async fn create_repository(&self, repo_root: &Path) -> std::result::Result<(), String> {
        self.run(Some(repo_root), &["init"], None).await?;

        tokio::fs::write(repo_root.join(README_FILE), README)
            .await
            .map_err(|e| format!("failed to write {README_FILE}: {e}"))?;

        self.run(Some(repo_root), &["add", README_FILE], None).await?;

        let author = self.identity_in(Some(repo_root)).await.identity;
        self.run(
            Some(repo_root),
            &["commit", "-m", INITIAL_COMMIT_MESSAGE],
            Some(&author),
        )
        .await?;

        Ok(())
    }

    async fn identity_in(&self, dir: Option<&Path>) -> ResolvedIdentity {
        let name = self.config_value(dir, "user.name").await;
        let email = self.config_value(dir, "user.email").await;

        let mut missing = Vec::new();
        if name.is_none() {
            missing.push("user.name".to_string());
        }
        if email.is_none() {
            missing.push("user.email".to_string());
        }

        let warning = (!missing.is_empty()).then(|| IdentityWarning { missing });
        if let Some(w) = &warning {
            log::warn!("{w}");
        }

        ResolvedIdentity {
            identity: Identity {
                name: name.unwrap_or_else(|| FALLBACK_NAME.to_string()),
                email: email.unwrap_or_else(|| FALLBACK_EMAIL.to_string()),
            },
            warning,
        }
    }
}

impl Default for GitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionControl for GitAdapter {
    fn repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }

    async fn initialize(&mut self, repo_root: &Path) -> Result<()> {
        tokio::fs::create_dir_all(repo_root)
            .await
            .map_err(|e| StoreError::repository_init(repo_root, e))?;

        self.run(None, &["--version"], None)
            .await
            .map_err(|e| StoreError::repository_init(repo_root, format!("git is not available: {e}")))?;

        let has_metadata = tokio::fs::try_exists(repo_root.join(".git"))
            .await
            .unwrap_or(false);

        if !has_metadata {
            self.create_repository(repo_root)
                .await
                .map_err(|e| StoreError::repository_init(repo_root, e))?;
            log::info!("Created annotation repository at {}", repo_root.display());
        } else {
            log::info!("Using annotation repository at {}", repo_root.display());
        }

        self.repo_root = Some(repo_root.to_path_buf());
        Ok(())
    }

    async fn identity(&self) -> ResolvedIdentity {
        self.identity_in(self.repo_root.as_deref()).await
    }

    async fn commit_and_maybe_push(&self, message: &str) -> Result<CommitOutcome> {
        let root = self.bound_root()?;

        self.run(Some(root), &["add", "-A"], None)
            .await
            .map_err(|e| StoreError::vcs("add", e))?;

        let status = self
            .run(Some(root), &["status", "--porcelain"], None)
            .await
            .map_err(|e| StoreError::vcs("status", e))?;

        if status.trim().is_empty() {
            log::debug!("Nothing to commit in {}", root.display());
            return Ok(CommitOutcome::NothingToCommit);
        }

        let author = self.identity().await.identity;
        self.run(Some(root), &["commit", "-m", message], Some(&author))
            .await
            .map_err(|e| StoreError::vcs("commit", e))?;
        log::info!("Committed: {message}");

        let pushed_to = match self.default_remote(root).await? {
            Some(remote) => {
                let branch = self.current_branch(root).await?;
                self.run(Some(root), &["push", "-u", &remote, &branch], None)
                    .await
                    .map_err(|e| StoreError::sync(SyncOperation::Push, &remote, e))?;
                log::info!("Pushed {branch} to {remote}");
                Some(remote)
            }
            None => None,
        };

        Ok(CommitOutcome::Committed { pushed_to })
    }

    async fn pull(&self) -> Result<PullOutcome> {
        let root = self.bound_root()?;

        let Some(remote) = self.default_remote(root).await? else {
            log::debug!("No remote configured, skipping pull");
            return Ok(PullOutcome::NoRemote);
        };

        let branch = self.current_branch(root).await?;
        let author = self.identity().await.identity;
        self.run(
            Some(root),
            &["pull", "--no-rebase", "--no-edit", &remote, &branch],
            Some(&author),
        )
        .await
        .map_err(|e| StoreError::sync(SyncOperation::Pull, &remote, e))?;

        log::info!("Pulled {branch} from {remote}");
        Ok(PullOutcome::Pulled { remote })
    }

    async fn remotes(&self) -> Result<Vec<String>> {
        let root = self.bound_root()?;
        self.list_remotes(root).await
    }
}
