//! Contract for the external text generation API.
//!
//! The pipeline only needs two calls: a one-shot `generate` and a streaming
//! `generate_stream` yielding text chunks in order. Streams are finite and
//! cannot be restarted; a failure part-way means the partial output is unusable.

use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Ordered text chunks from a streaming generation call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Role names as the generation API expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiRole {
    User,
    /// Model-authored turns; stored as `assistant`.
    Model,
}

impl ApiRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiRole::User => "user",
            ApiRole::Model => "model",
        }
    }
}

/// One turn of conversation history in API shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: ApiRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ApiRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: ApiRole::Model,
            content: content.into(),
        }
    }
}

/// Everything one generation call needs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub history: Vec<HistoryEntry>,
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, history: Vec<HistoryEntry>) -> Self {
        Self {
            model: model.into(),
            history,
            system_prompt: None,
        }
    }

    /// Attach a system prompt; blank prompts are dropped.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = if prompt.trim().is_empty() {
            None
        } else {
            Some(prompt)
        };
        self
    }
}

/// A text generation backend.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Non-streaming completion.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;

    /// Streaming completion.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream>;
}
