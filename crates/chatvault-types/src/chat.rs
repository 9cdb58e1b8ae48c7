//! Chat message types.
//!
//! A message is one turn inside a thread. Messages are immutable once written;
//! ordering inside a thread follows `created_at`, with the row id as tie-breaker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing prompts.
    User,
    /// The generative model's reply.
    Assistant,
}

impl Role {
    /// The storage representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Human-facing label used in transcripts ("User", "Assistant").
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored role string is neither `user` nor `assistant`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown message role: '{0}'")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Row id.
    pub id: i64,
    /// Owning thread.
    pub thread_id: i64,
    /// Who sent this message
    pub role: Role,
    /// Message text content
    pub content: String,
    /// Creation time, defines in-thread ordering.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this message was written by the user.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// First `max_chars` characters of the content, on a single line.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .content
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let mut preview: String = flat.chars().take(max_chars).collect();
        if flat.chars().count() > max_chars {
            preview.push('…');
        }
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> Message {
        Message {
            id: 1,
            thread_id: 1,
            role: Role::User,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!(Role::Assistant.as_str(), "assistant");
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn test_role_rejects_unknown() {
        let err = "model".parse::<Role>().unwrap_err();
        assert_eq!(err, ParseRoleError("model".to_string()));
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_preview_truncates_and_flattens() {
        let msg = message("line one\nline two");
        assert_eq!(msg.preview(8), "line one…");
        assert_eq!(msg.preview(100), "line one line two");
    }

    #[test]
    fn test_preview_counts_characters_not_bytes() {
        let msg = message("日本語のテキスト");
        assert_eq!(msg.preview(3), "日本語…");
    }
}
