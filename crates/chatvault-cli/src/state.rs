//! Shared application state.

use crate::config::Config;
use chatvault_core::{
    ChatStore, ConversationPipeline, GeminiClient, GenerationClient, StateFile, TranscriptLog,
};
use std::sync::Arc;

/// Everything a command needs.
pub struct AppState {
    pub store: Arc<ChatStore>,
    pub state_file: StateFile,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> chatvault_core::Result<Self> {
        let store = Arc::new(ChatStore::open(&config.db_path)?);
        let state_file = StateFile::new(config.state_file.clone());

        Ok(Self {
            store,
            state_file,
            config,
        })
    }

    /// Build a pipeline around the configured Gemini client.
    ///
    /// Only chat needs the API key, so the client is created on demand.
    pub fn pipeline(&self) -> chatvault_core::Result<ConversationPipeline> {
        let client = GeminiClient::from_env(&self.config.api_key_env)?
            .with_base_url(self.config.api_base_url.clone())
            .with_google_search(self.config.google_search);
        Ok(self.pipeline_with(Arc::new(client)))
    }

    /// Build a pipeline around any generation backend.
    pub fn pipeline_with(&self, client: Arc<dyn GenerationClient>) -> ConversationPipeline {
        let pipeline = ConversationPipeline::new(self.store.clone(), client)
            .with_title_length(self.config.title_length)
            .with_streaming(self.config.streaming);

        match &self.config.transcript_dir {
            Some(dir) => pipeline.with_transcript(TranscriptLog::new(dir)),
            None => pipeline,
        }
    }
}
