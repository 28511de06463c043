//! Runtime Settings
//!
//! Where run state lives. Resolution order for the home directory:
//! `RUNBOOK_HOME`, then `~/.runbook`, then `./.runbook`. State records are
//! kept in `<home>/state/` unless a state directory is given explicitly.

use std::env;
use std::path::{Path, PathBuf};

use crate::workflow::StateStore;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "RUNBOOK_HOME";

/// Directory name used under the user's home.
const HOME_DIR_NAME: &str = ".runbook";

const STATE_DIR_NAME: &str = "state";

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub home: PathBuf,
    pub state_dir: PathBuf,
}

impl Settings {
    /// Builds settings rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let state_dir = home.join(STATE_DIR_NAME);
        Self { home, state_dir }
    }

    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::with_home(resolve_home(
            env::var_os(HOME_ENV).map(PathBuf::from),
            user_home(),
        ))
    }

    /// Replaces the state directory, leaving the home as is.
    pub fn with_state_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.state_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(&self.state_dir)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

fn user_home() -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn resolve_home(explicit: Option<PathBuf>, user_home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    user_home
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_home_wins() {
        let home = resolve_home(Some("/opt/rb".into()), Some("/home/me".into()));
        assert_eq!(home, PathBuf::from("/opt/rb"));
    }

    #[test]
    fn test_user_home_fallback() {
        let home = resolve_home(None, Some("/home/me".into()));
        assert_eq!(home, PathBuf::from("/home/me/.runbook"));

        let home = resolve_home(Some(PathBuf::new()), Some("/home/me".into()));
        assert_eq!(home, PathBuf::from("/home/me/.runbook"));
    }

    #[test]
    fn test_current_dir_fallback() {
        assert_eq!(resolve_home(None, None), PathBuf::from("./.runbook"));
    }

    #[test]
    fn test_state_dir() {
        let settings = Settings::with_home("/srv/runbook");
        assert_eq!(settings.state_dir, PathBuf::from("/srv/runbook/state"));

        let settings = settings.with_state_dir("/tmp/state");
        assert_eq!(settings.home, PathBuf::from("/srv/runbook"));
        assert_eq!(settings.store().dir(), Path::new("/tmp/state"));
    }
}
