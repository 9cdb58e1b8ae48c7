//! One chat turn: persist the prompt, generate a reply, persist the reply.
//!
//! The user message is committed before generation starts so it survives a
//! failed call. The assistant message is only written once the response is
//! complete; a stream that fails part-way leaves no trace beyond the prompt.

use crate::db::ChatStore;
use crate::export::TranscriptLog;
use crate::generation::{GenerationClient, GenerationRequest, HistoryEntry, TextStream};
use crate::{ChatError, Result};
use chatvault_types::{Message, Role, Thread};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default length of an auto-generated thread title, in characters.
pub const DEFAULT_TITLE_LENGTH: usize = 20;

/// What a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message: Message,
    pub assistant_message: Message,
    /// New thread name, if this was the thread's first exchange.
    pub renamed_to: Option<String>,
    /// History rows left out of the request because they could not be used.
    pub skipped_history: usize,
}

pub struct ConversationPipeline {
    store: Arc<ChatStore>,
    client: Arc<dyn GenerationClient>,
    transcript: Option<TranscriptLog>,
    title_length: usize,
    streaming: bool,
}

impl ConversationPipeline {
    pub fn new(store: Arc<ChatStore>, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            store,
            client,
            transcript: None,
            title_length: DEFAULT_TITLE_LENGTH,
            streaming: true,
        }
    }

    /// Append every persisted message to a Markdown transcript.
    pub fn with_transcript(mut self, transcript: TranscriptLog) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn with_title_length(mut self, title_length: usize) -> Self {
        self.title_length = title_length.max(1);
        self
    }

    /// Use `generate_stream` (default) or a single `generate` call.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    /// Run one turn on `thread_id`.
    ///
    /// `on_update` receives the accumulated reply after every chunk. Turns on
    /// the same thread must not overlap.
    pub async fn run_turn<F>(
        &self,
        thread_id: i64,
        prompt: &str,
        mut on_update: F,
    ) -> Result<TurnOutcome>
    where
        F: FnMut(&str) + Send,
    {
        if prompt.trim().is_empty() {
            return Err(ChatError::Validation("Prompt cannot be empty".to_string()));
        }

        let thread = self
            .store
            .get_thread(thread_id)?
            .ok_or(ChatError::ThreadNotFound(thread_id))?;
        let project = self
            .store
            .get_project(thread.project_id)?
            .ok_or(ChatError::ProjectNotFound(thread.project_id))?;
        let first_exchange = self.store.count_messages(thread_id)? == 0;

        let user_message = self.store.append_message(thread_id, Role::User, prompt)?;
        self.record(&project.name, &thread, Role::User, prompt);

        let (history, skipped_history) = self.assemble_history(thread_id)?;
        let request = GenerationRequest::new(project.model_name.clone(), history)
            .with_system_prompt(project.system_prompt.clone());

        debug!(
            target: "chatvault::pipeline",
            thread_id,
            model = %project.model_name,
            history = request.history.len(),
            streaming = self.streaming,
            "Requesting reply"
        );

        let reply = match self.collect_reply(request, &mut on_update).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    target: "chatvault::pipeline",
                    thread_id,
                    user_message_id = user_message.id,
                    "Generation failed, keeping prompt only: {}", e
                );
                return Err(e);
            }
        };

        let assistant_message = self
            .store
            .append_message(thread_id, Role::Assistant, &reply)?;
        self.record(&project.name, &thread, Role::Assistant, &reply);

        let renamed_to = if first_exchange {
            self.auto_rename(thread_id, prompt)
        } else {
            None
        };

        info!(
            target: "chatvault::pipeline",
            thread_id,
            reply_chars = reply.chars().count(),
            renamed = renamed_to.is_some(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            user_message,
            assistant_message,
            renamed_to,
            skipped_history,
        })
    }

    /// Convert the thread's stored messages into API history.
    fn assemble_history(&self, thread_id: i64) -> Result<(Vec<HistoryEntry>, usize)> {
        let rows = self.store.list_raw_messages(thread_id)?;
        let mut history = Vec::with_capacity(rows.len());
        let mut skipped = 0;

        for row in rows {
            if row.content.trim().is_empty() {
                warn!(target: "chatvault::pipeline", message_id = row.id, "Skipping blank history entry");
                skipped += 1;
                continue;
            }
            match row.role.parse::<Role>() {
                Ok(Role::User) => history.push(HistoryEntry::user(row.content)),
                Ok(Role::Assistant) => history.push(HistoryEntry::model(row.content)),
                Err(e) => {
                    warn!(target: "chatvault::pipeline", message_id = row.id, "Skipping history entry: {}", e);
                    skipped += 1;
                }
            }
        }

        Ok((history, skipped))
    }

    async fn collect_reply<F>(&self, request: GenerationRequest, on_update: &mut F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let mut stream: TextStream = if self.streaming {
            self.client.generate_stream(request).await?
        } else {
            let text = self.client.generate(request).await?;
            let once: TextStream = Box::pin(futures::stream::iter([Ok::<_, ChatError>(text)]));
            once
        };

        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            buffer.push_str(&chunk);
            on_update(&buffer);
        }

        if buffer.trim().is_empty() {
            return Err(ChatError::Generation("Empty response".to_string()));
        }
        Ok(buffer)
    }

    /// Name the thread after the start of its first prompt.
    fn auto_rename(&self, thread_id: i64, prompt: &str) -> Option<String> {
        let title: String = prompt.trim().chars().take(self.title_length).collect();
        let title = title.trim();
        if title.is_empty() {
            return None;
        }

        match self.store.rename_thread(thread_id, title) {
            Ok(thread) => Some(thread.name),
            Err(e) => {
                warn!(target: "chatvault::pipeline", thread_id, "Auto-rename failed: {}", e);
                None
            }
        }
    }

    fn record(&self, project_name: &str, thread: &Thread, role: Role, content: &str) {
        let Some(transcript) = &self.transcript else {
            return;
        };
        if let Err(e) = transcript.append(project_name, thread.id, &thread.name, role, content) {
            warn!(target: "chatvault::pipeline", thread_id = thread.id, "Transcript write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatvault_types::{NewProject, DEFAULT_THREAD_NAME};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies with fixed chunks, or fails after emitting some of them.
    struct ScriptedClient {
        chunks: Vec<&'static str>,
        fail_after: Option<usize>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedClient {
        fn replying(chunks: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                fail_after: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing_after(chunks: Vec<&'static str>, n: usize) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                fail_after: Some(n),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> GenerationRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            if self.fail_after.is_some() {
                return Err(ChatError::Generation("scripted failure".to_string()));
            }
            Ok(self.chunks.concat())
        }

        async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream> {
            self.requests.lock().unwrap().push(request);
            let mut items: Vec<Result<String>> =
                self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(ChatError::Generation("stream broke".to_string())));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn setup(client: Arc<ScriptedClient>) -> (ConversationPipeline, Thread) {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let project = store
            .create_project(&NewProject::new("Project", "Answer briefly."))
            .unwrap();
        let thread = store.create_thread(project.id, None).unwrap();
        (ConversationPipeline::new(store, client), thread)
    }

    #[tokio::test]
    async fn test_first_turn_persists_and_renames() {
        let client = ScriptedClient::replying(vec!["Hi", " there", "!"]);
        let (pipeline, thread) = setup(client.clone());

        let mut updates = Vec::new();
        let outcome = pipeline
            .run_turn(thread.id, "Hello world, this is a test", |buf| {
                updates.push(buf.to_string())
            })
            .await
            .unwrap();

        assert_eq!(updates, vec!["Hi", "Hi there", "Hi there!"]);
        assert_eq!(outcome.assistant_message.content, "Hi there!");
        assert_eq!(outcome.renamed_to.as_deref(), Some("Hello world, this is"));

        let messages = pipeline.store().list_messages(thread.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello world, this is a test");
        assert_eq!(messages[1].role, Role::Assistant);

        let renamed = pipeline.store().get_thread(thread.id).unwrap().unwrap();
        assert_eq!(renamed.name, "Hello world, this is");

        let request = client.last_request();
        assert_eq!(request.system_prompt.as_deref(), Some("Answer briefly."));
        assert_eq!(request.history, vec![HistoryEntry::user("Hello world, this is a test")]);
    }

    #[tokio::test]
    async fn test_second_turn_keeps_name_and_sends_history() {
        let client = ScriptedClient::replying(vec!["ok"]);
        let (pipeline, thread) = setup(client.clone());

        pipeline.run_turn(thread.id, "first question", |_| {}).await.unwrap();
        let outcome = pipeline.run_turn(thread.id, "second question", |_| {}).await.unwrap();

        assert!(outcome.renamed_to.is_none());
        let name = pipeline.store().get_thread(thread.id).unwrap().unwrap().name;
        assert_eq!(name, "first question");

        assert_eq!(
            client.last_request().history,
            vec![
                HistoryEntry::user("first question"),
                HistoryEntry::model("ok"),
                HistoryEntry::user("second question"),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_user_message_only() {
        let client = ScriptedClient::failing_after(vec!["partial", "never"], 1);
        let (pipeline, thread) = setup(client);

        let mut updates = Vec::new();
        let err = pipeline
            .run_turn(thread.id, "doomed prompt", |buf| updates.push(buf.to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Generation(_)));
        assert_eq!(updates, vec!["partial"]);

        let messages = pipeline.store().list_messages(thread.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);

        let thread = pipeline.store().get_thread(thread.id).unwrap().unwrap();
        assert_eq!(thread.name, DEFAULT_THREAD_NAME);
    }

    #[tokio::test]
    async fn test_empty_reply_is_an_error() {
        let client = ScriptedClient::replying(vec!["", ""]);
        let (pipeline, thread) = setup(client);

        let err = pipeline.run_turn(thread.id, "hello", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Generation(_)));
        assert_eq!(pipeline.store().count_messages(thread.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_buffered_mode() {
        let client = ScriptedClient::replying(vec!["one ", "shot"]);
        let (pipeline, thread) = setup(client);
        let pipeline = pipeline.with_streaming(false);

        let mut updates = Vec::new();
        let outcome = pipeline
            .run_turn(thread.id, "q", |buf| updates.push(buf.to_string()))
            .await
            .unwrap();

        assert_eq!(updates, vec!["one shot"]);
        assert_eq!(outcome.assistant_message.content, "one shot");
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected_without_writes() {
        let client = ScriptedClient::replying(vec!["x"]);
        let (pipeline, thread) = setup(client);

        let err = pipeline.run_turn(thread.id, "   ", |_| {}).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(pipeline.store().count_messages(thread.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_thread() {
        let client = ScriptedClient::replying(vec!["x"]);
        let (pipeline, _) = setup(client);

        let err = pipeline.run_turn(999, "hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::ThreadNotFound(999)));
    }

    #[tokio::test]
    async fn test_short_title_and_custom_length() {
        let client = ScriptedClient::replying(vec!["x"]);
        let (pipeline, thread) = setup(client);
        let pipeline = pipeline.with_title_length(5);

        let outcome = pipeline.run_turn(thread.id, "日本語のテストです", |_| {}).await.unwrap();
        assert_eq!(outcome.renamed_to.as_deref(), Some("日本語のテ"));
    }

    #[tokio::test]
    async fn test_transcript_written_under_original_name() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::replying(vec!["answer"]);
        let (pipeline, thread) = setup(client);
        let pipeline = pipeline.with_transcript(TranscriptLog::new(dir.path()));

        pipeline.run_turn(thread.id, "question", |_| {}).await.unwrap();

        let path = dir
            .path()
            .join("Project")
            .join(format!("{} ({}).md", DEFAULT_THREAD_NAME, thread.id));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("**[User]**"));
        assert!(text.contains("**[Assistant]**"));
        assert!(text.contains("answer"));
    }

    #[tokio::test]
    async fn test_transcript_failure_does_not_fail_turn() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let client = ScriptedClient::replying(vec!["fine"]);
        let (pipeline, thread) = setup(client);
        let pipeline = pipeline.with_transcript(TranscriptLog::new(&blocker));

        let outcome = pipeline.run_turn(thread.id, "q", |_| {}).await.unwrap();
        assert_eq!(outcome.assistant_message.content, "fine");
    }
}
