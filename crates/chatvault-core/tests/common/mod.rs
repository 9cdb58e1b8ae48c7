//! Common test utilities for chatvault-core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chatvault_core::{ChatError, ChatStore, GenerationClient, GenerationRequest, Result, TextStream};
use chatvault_types::{NewProject, Project, Role, Thread};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A store backed by a file in a temporary directory.
pub fn open_store() -> (ChatStore, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let store = ChatStore::open(&dir.path().join("chat.db")).expect("open store");
    (store, dir)
}

/// Create a project with one thread holding `messages`.
pub fn seed_thread(store: &ChatStore, project: &str, messages: &[(Role, &str)]) -> (Project, Thread) {
    let project = match store.get_project_by_name(project).unwrap() {
        Some(existing) => existing,
        None => store.create_project(&NewProject::new(project, "")).unwrap(),
    };
    let thread = store.create_thread(project.id, None).unwrap();
    for (role, content) in messages {
        store.append_message(thread.id, *role, content).unwrap();
    }
    (project, thread)
}

/// Generation client that replays queued replies, one per call.
///
/// `Ok(chunks)` streams the chunks; `Err(msg)` fails the call.
pub struct ScriptedClient {
    replies: Mutex<Vec<std::result::Result<Vec<String>, String>>>,
    pub calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<std::result::Result<Vec<&str>, &str>>) -> Arc<Self> {
        let mut replies: Vec<_> = replies
            .into_iter()
            .map(|r| {
                r.map(|chunks| chunks.into_iter().map(String::from).collect())
                    .map_err(String::from)
            })
            .collect();
        replies.reverse();
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn next_reply(&self, request: GenerationRequest) -> std::result::Result<Vec<String>, String> {
        self.calls.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err("no scripted reply left".to_string()))
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        self.next_reply(request)
            .map(|chunks| chunks.concat())
            .map_err(ChatError::Generation)
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream> {
        let chunks = self.next_reply(request).map_err(ChatError::Generation)?;
        let items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
