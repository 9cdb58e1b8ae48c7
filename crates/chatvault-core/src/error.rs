//! Error types for Chatvault.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A project named '{0}' already exists")]
    DuplicateName(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(i64),

    #[error("Thread not found: {0}")]
    ThreadNotFound(i64),

    #[error("Message not found: {0}")]
    MessageNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Generation API error: {0}")]
    Generation(String),

    #[error("Search index out of sync: {0}")]
    IndexSync(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl ChatError {
    /// True for errors caused by a missing project, thread or message.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChatError::ProjectNotFound(_)
                | ChatError::ThreadNotFound(_)
                | ChatError::MessageNotFound(_)
        )
    }

    /// True for caller mistakes that were rejected before any mutation.
    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::Validation(_) | ChatError::DuplicateName(_))
    }
}
