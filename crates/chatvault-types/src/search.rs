//! Search and export result types.

use crate::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label used when a search hit's thread or project no longer exists.
pub const MISSING_LABEL: &str = "(deleted)";

/// A matching message enriched with its owning thread and project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched message.
    pub message: Message,
    /// Owning thread id, if the thread still exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    /// Thread name, or [`MISSING_LABEL`].
    pub thread_name: String,
    /// Owning project id, if the project still exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    /// Project name, or [`MISSING_LABEL`].
    pub project_name: String,
}

/// Consistency report for the message search index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHealth {
    /// Rows in `messages`.
    pub messages: u64,
    /// Rows in the search index.
    pub indexed: u64,
    /// Messages with no index row.
    pub missing: u64,
    /// Index rows whose message is gone or whose folded text is out of date.
    pub stale: u64,
}

impl IndexHealth {
    pub fn is_consistent(&self) -> bool {
        self.missing == 0 && self.stale == 0
    }
}

/// One message joined with its thread and project, for tabular export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub project_id: i64,
    pub project_name: String,
    pub project_system_prompt: String,
    pub project_created_at: DateTime<Utc>,
    pub thread_id: i64,
    pub thread_name: String,
    pub thread_created_at: DateTime<Utc>,
    pub message_id: i64,
    pub message_role: String,
    pub message_content: String,
    pub message_created_at: DateTime<Utc>,
}
