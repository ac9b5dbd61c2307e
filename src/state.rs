//! Persistence of the custom patch and any pending continuation.
//!
//! Each CLI invocation is its own process, so a rebase paused on conflicts
//! can only be resumed if the pending work survives on disk.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use error_set::error_set;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::patch::PatchManager;
use crate::rebase::RebaseWorkflow;

error_set! {
    /// Errors reading or writing session state
    StateError := {
        #[display("Failed to read session state {path}: {message}")]
        Read { path: String, message: String },
        #[display("Failed to write session state {path}: {message}")]
        Write { path: String, message: String },
        #[display("Session state {path} is corrupt: {message}")]
        Corrupt { path: String, message: String },
    }
}

/// Everything a session carries between invocations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub patch: PatchManager,
    pub workflow: RebaseWorkflow,
}

/// JSON file holding a [`SessionState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store kept under a repository's git directory
    pub fn in_git_dir(git_dir: &Path) -> Self {
        Self::new(git_dir.join("git-carve").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state, or the empty state when nothing was saved.
    pub fn load(&self) -> Result<SessionState, StateError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SessionState::default()),
            Err(e) => {
                return Err(StateError::Read {
                    path: self.display(),
                    message: e.to_string(),
                });
            }
        };

        serde_json::from_str(&text).map_err(|e| StateError::Corrupt {
            path: self.display(),
            message: e.to_string(),
        })
    }

    /// Save `state`, removing the file instead when the state is empty.
    pub fn save(&self, state: &SessionState) -> Result<(), StateError> {
        if *state == SessionState::default() {
            return self.clear();
        }

        let write_error = |e: &dyn std::fmt::Display| StateError::Write {
            path: self.display(),
            message: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(&e))?;
        }
        let json = serde_json::to_string_pretty(state).map_err(|e| write_error(&e))?;
        fs::write(&self.path, json).map_err(|e| write_error(&e))?;
        debug!(path = %self.path.display(), "saved session state");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::Write {
                path: self.display(),
                message: e.to_string(),
            }),
        }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rebase::Continuation;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty_state() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::in_git_dir(dir.path());
        assert_eq!(store.load().unwrap(), SessionState::default());
    }

    #[test]
    fn save_and_load_pending_work() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::in_git_dir(dir.path());

        let mut state = SessionState::default();
        state.patch.start("abc123", [("a.txt", "diff --git a/a.txt b/a.txt\n")]);
        state.patch.add_file_whole("a.txt").unwrap();
        state.workflow.start(Continuation::ResetPatch).unwrap();

        store.save(&state).unwrap();
        assert!(dir.path().join("git-carve/state.json").exists());
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn saving_empty_state_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::in_git_dir(dir.path());

        let mut state = SessionState::default();
        state.workflow.start(Continuation::ResetPatch).unwrap();
        store.save(&state).unwrap();
        assert!(store.path().exists());

        store.save(&SessionState::default()).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(StateError::Corrupt { .. })));
    }
}
