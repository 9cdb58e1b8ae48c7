//! Project and thread types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name given to a thread until the first exchange renames it.
pub const DEFAULT_THREAD_NAME: &str = "New Thread";

/// Model used when a project is created without an explicit choice.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Top-level grouping of threads with its own system prompt and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    /// Unique across all projects.
    pub name: String,
    /// Instruction text sent with every generation call.
    pub system_prompt: String,
    /// Generation model identifier.
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Options for creating a new project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub system_prompt: String,
    /// Falls back to [`DEFAULT_MODEL`] when `None`.
    pub model_name: Option<String>,
}

impl NewProject {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            model_name: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// The model to persist.
    pub fn model_or_default(&self) -> &str {
        self.model_name.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// One ordered conversation within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every message append and rename; drives recency ordering.
    pub updated_at: DateTime<Utc>,
}

/// Thread with its message count, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub message_count: u32,
}

/// Row counts across the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub project_count: u64,
    pub thread_count: u64,
    pub message_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_model_default() {
        let project = NewProject::new("Research", "You are helpful.");
        assert_eq!(project.model_or_default(), DEFAULT_MODEL);

        let project = project.with_model("gemini-2.5-pro");
        assert_eq!(project.model_or_default(), "gemini-2.5-pro");
    }

    #[test]
    fn test_thread_summary_flattens() {
        let now = Utc::now();
        let summary = ThreadSummary {
            thread: Thread {
                id: 3,
                project_id: 1,
                name: DEFAULT_THREAD_NAME.to_string(),
                created_at: now,
                updated_at: now,
            },
            message_count: 2,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["name"], "New Thread");
        assert_eq!(json["message_count"], 2);
    }
}
