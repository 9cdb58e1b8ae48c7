//! Shared types for the Chatvault chat history store.

mod chat;
mod project;
mod search;

pub use chat::*;
pub use project::*;
pub use search::*;
