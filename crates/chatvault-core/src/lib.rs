//! Storage, search and conversation handling for Chatvault.

mod db;
mod error;
pub mod export;
pub mod gemini;
pub mod generation;
mod lifecycle;
mod pipeline;
pub mod search;
mod session;

pub use db::ChatStore;
pub use error::ChatError;
pub use export::{export_csv, TranscriptLog};
pub use gemini::GeminiClient;
pub use generation::{ApiRole, GenerationClient, GenerationRequest, HistoryEntry, TextStream};
pub use pipeline::{ConversationPipeline, TurnOutcome, DEFAULT_TITLE_LENGTH};
pub use session::{SessionContext, SessionState, StateFile};

/// Result type for Chatvault operations.
pub type Result<T> = std::result::Result<T, ChatError>;
