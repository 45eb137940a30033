//! Server configuration.

use codenotes_store::GitAdapter;
use std::path::PathBuf;

/// Directory under the home directory used when no repository root is given
pub const DEFAULT_REPO_DIR: &str = ".codenotes";

/// Resolved settings for one server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Where the annotation repository lives
    pub repo_root: PathBuf,
    /// Remote preferred for push and pull
    pub preferred_remote: String,
    /// git executable
    pub git_program: PathBuf,
}

impl ServerConfig {
    pub fn new(repo_root: Option<PathBuf>, preferred_remote: String, git_program: PathBuf) -> Self {
        Self {
            repo_root: repo_root.unwrap_or_else(default_repo_root),
            preferred_remote,
            git_program,
        }
    }

    /// Version-control adapter configured from these settings
    pub fn adapter(&self) -> GitAdapter {
        GitAdapter::new()
            .with_program(&self.git_program)
            .with_preferred_remote(&self.preferred_remote)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(None, "origin".to_string(), PathBuf::from("git"))
    }
}

/// `~/.codenotes`, resolved through the platform's home directory lookup.
///
/// Only a platform with no home directory at all gets `./.codenotes`.
pub fn default_repo_root() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from(DEFAULT_REPO_DIR),
        |home| home.join(DEFAULT_REPO_DIR),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_repo_root_wins() {
        let config = ServerConfig::new(
            Some(PathBuf::from("/data/notes")),
            "upstream".into(),
            PathBuf::from("/usr/bin/git"),
        );
        assert_eq!(config.repo_root, PathBuf::from("/data/notes"));
        assert_eq!(config.preferred_remote, "upstream");
    }

    #[test]
    fn test_default_repo_root_ends_with_dir() {
        assert!(default_repo_root().ends_with(DEFAULT_REPO_DIR));
        assert!(ServerConfig::default().repo_root.ends_with(DEFAULT_REPO_DIR));
    }

    #[test]
    fn test_default_repo_root_is_under_home() {
        if let Some(home) = dirs::home_dir() {
            let root = default_repo_root();
            assert_eq!(root, home.join(DEFAULT_REPO_DIR));
        }
    }

    #[test]
    fn test_adapter_starts_unbound() {
        assert!(!ServerConfig::default().adapter().is_initialized());
    }
}
