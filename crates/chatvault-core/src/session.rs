//! Session context: which project and thread are selected, and the small
//! state file that remembers the last project between runs.

use crate::db::ChatStore;
use crate::{ChatError, Result};
use chatvault_types::{Project, Thread};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub last_project_id: Option<i64>,
}

/// JSON key-value file holding [`SessionState`].
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state. A missing or unreadable file means "no prior session".
    pub fn load(&self) -> SessionState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SessionState::default(),
            Err(e) => {
                warn!(target: "chatvault::session", "Failed to read {}: {}", self.path.display(), e);
                return SessionState::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(target: "chatvault::session", "Ignoring corrupt state file {}: {}", self.path.display(), e);
            SessionState::default()
        })
    }

    pub fn save(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }
}

/// Current selection. Passed explicitly to whatever drives the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub project_id: Option<i64>,
    pub thread_id: Option<i64>,
}

impl SessionContext {
    /// Resume the last project from the state file.
    ///
    /// A fresh empty thread is created in that project and any other empty
    /// threads left behind by abandoned sessions are swept. If the project no
    /// longer exists, the session starts with nothing selected.
    pub fn restore(store: &ChatStore, state_file: &StateFile) -> Result<Self> {
        let state = state_file.load();
        let Some(project_id) = state.last_project_id else {
            return Ok(Self::default());
        };

        if store.get_project(project_id)?.is_none() {
            info!(target: "chatvault::session", project_id, "Last project no longer exists");
            return Ok(Self::default());
        }

        let thread = store.create_thread(project_id, None)?;
        let swept = store.prune_empty_threads(project_id, Some(thread.id));
        debug!(
            target: "chatvault::session",
            project_id,
            thread_id = thread.id,
            swept,
            "Restored session"
        );

        Ok(Self {
            project_id: Some(project_id),
            thread_id: Some(thread.id),
        })
    }

    /// Select a project, clearing the thread, and remember it.
    pub fn select_project(
        &mut self,
        store: &ChatStore,
        state_file: &StateFile,
        project_id: i64,
    ) -> Result<Project> {
        let project = store
            .get_project(project_id)?
            .ok_or(ChatError::ProjectNotFound(project_id))?;

        if self.project_id != Some(project_id) {
            self.thread_id = None;
        }
        self.project_id = Some(project_id);
        remember(state_file, Some(project_id));
        Ok(project)
    }

    /// Select a thread (and its project).
    pub fn select_thread(
        &mut self,
        store: &ChatStore,
        state_file: &StateFile,
        thread_id: i64,
    ) -> Result<Thread> {
        let thread = store
            .get_thread(thread_id)?
            .ok_or(ChatError::ThreadNotFound(thread_id))?;

        if self.project_id != Some(thread.project_id) {
            self.project_id = Some(thread.project_id);
            remember(state_file, self.project_id);
        }
        self.thread_id = Some(thread_id);
        Ok(thread)
    }

    /// Forget a project after it has been deleted.
    pub fn forget_project(&mut self, state_file: &StateFile, project_id: i64) {
        if self.project_id == Some(project_id) {
            self.project_id = None;
            self.thread_id = None;
        }
        if state_file.load().last_project_id == Some(project_id) {
            remember(state_file, None);
        }
    }
}

/// Best-effort write of the state file.
fn remember(state_file: &StateFile, project_id: Option<i64>) {
    let state = SessionState {
        last_project_id: project_id,
    };
    if let Err(e) = state_file.save(&state) {
        warn!(target: "chatvault::session", "Failed to save session state: {}", e);
    }
}
