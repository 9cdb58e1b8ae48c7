//! Gemini HTTP client (direct REST, no SDK).

use crate::generation::{GenerationClient, GenerationRequest, HistoryEntry, TextStream};
use crate::{ChatError, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the API key by default.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Gemini `generateContent` / `streamGenerateContent` client.
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    google_search: bool,
}

impl GeminiClient {
    /// Create a client with an API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChatError::Config("Gemini API key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| ChatError::Config("Invalid API key format".to_string()))?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: GEMINI_API_BASE.to_string(),
            google_search: false,
        })
    }

    /// Create a client with the key read from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let key = std::env::var(var).map_err(|_| {
            ChatError::Config(format!("{var} is not set; export your Gemini API key"))
        })?;
        Self::new(key)
    }

    /// Point the client at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable the Google Search grounding tool on streaming requests.
    pub fn with_google_search(mut self, enabled: bool) -> Self {
        self.google_search = enabled;
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    /// Build the request payload.
    fn build_payload(&self, request: &GenerationRequest, stream: bool) -> Value {
        let contents: Vec<Value> = request.history.iter().map(convert_entry).collect();

        let mut payload = json!({ "contents": contents });
        if let Some(map) = payload.as_object_mut() {
            if let Some(prompt) = &request.system_prompt {
                map.insert(
                    "systemInstruction".to_string(),
                    json!({ "parts": [{ "text": prompt }] }),
                );
            }
            if stream && self.google_search {
                map.insert("tools".to_string(), json!([{ "google_search": {} }]));
            }
        }
        payload
    }

    async fn post(&self, url: String, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ChatError::Generation(format!("Failed to send request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ChatError::Generation(format!(
                "Gemini API error ({status}): {detail}"
            )));
        }
        Ok(response)
    }
}

fn convert_entry(entry: &HistoryEntry) -> Value {
    json!({
        "role": entry.role.as_str(),
        "parts": [{ "text": entry.content }],
    })
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let payload = self.build_payload(&request, false);
        tracing::debug!(
            target: "chatvault::gemini",
            model = %request.model,
            turns = request.history.len(),
            "generateContent"
        );

        let response = self
            .post(self.endpoint(&request.model, "generateContent"), &payload)
            .await?;
        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Generation(format!("Failed to parse response: {e}")))?;
        body.into_text()
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TextStream> {
        let payload = self.build_payload(&request, true);
        tracing::debug!(
            target: "chatvault::gemini",
            model = %request.model,
            turns = request.history.len(),
            "streamGenerateContent"
        );

        let url = format!(
            "{}?alt=sse",
            self.endpoint(&request.model, "streamGenerateContent")
        );
        let response = self.post(url, &payload).await?;
        Ok(parse_sse_text_stream(response.bytes_stream()))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// A `data:` payload is either an error envelope or a response chunk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error(ApiErrorBody),
    Chunk(GenerateContentResponse),
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn blocked(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }

    fn into_text(self) -> Result<String> {
        if let Some(reason) = self.blocked() {
            return Err(ChatError::Generation(format!("Prompt blocked: {reason}")));
        }
        if let Some(reason) = self.candidates.first().and_then(|c| c.finish_reason.as_deref()) {
            tracing::debug!(target: "chatvault::gemini", "Finish reason: {}", reason);
        }
        Ok(self.text())
    }
}

// ============================================================================
// SSE parsing
// ============================================================================

/// Interpret one SSE line. Returns `None` for lines that carry no text.
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Error(e)) => Some(Err(ChatError::Generation(e.error.message))),
        Ok(StreamPayload::Chunk(chunk)) => match chunk.into_text() {
            Ok(text) if text.is_empty() => None,
            other => Some(other),
        },
        Err(e) => Some(Err(ChatError::Generation(format!(
            "Failed to parse stream chunk: {e}"
        )))),
    }
}

/// Turn a byte stream of server-sent events into a stream of text chunks.
///
/// The stream ends after the first error.
fn parse_sse_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer: VecDeque<u8> = VecDeque::with_capacity(8192);

        while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.extend(bytes.as_ref());

                    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                        let line = String::from_utf8_lossy(&line_bytes);
                        match parse_sse_line(&line) {
                            Some(Ok(text)) => yield Ok(text),
                            Some(Err(e)) => {
                                yield Err(e);
                                return;
                            }
                            None => {}
                        }
                    }
                }
                Err(e) => {
                    yield Err(ChatError::Generation(format!("Stream error: {e}")));
                    return;
                }
            }
        }

        // Final event without a trailing newline
        if !buffer.is_empty() {
            let rest: Vec<u8> = buffer.drain(..).collect();
            if let Some(item) = parse_sse_line(&String::from_utf8_lossy(&rest)) {
                yield item;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ApiRole;

    fn client() -> GeminiClient {
        GeminiClient::new("test-key").unwrap()
    }

    fn chunk(text: &str) -> String {
        format!(
            "data: {}\r\n\r\n",
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
        )
    }

    async fn collect(pieces: Vec<String>) -> Vec<Result<String>> {
        let bytes = futures::stream::iter(
            pieces
                .into_iter()
                .map(|p| Ok::<_, std::io::Error>(p.into_bytes())),
        );
        parse_sse_text_stream(bytes).collect().await
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(GeminiClient::new("  "), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_endpoint() {
        let client = client().with_base_url("http://localhost:9000/v1beta/");
        assert_eq!(
            client.endpoint("models/gemini-2.0-flash", "generateContent"),
            "http://localhost:9000/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_build_payload_maps_roles_and_system_prompt() {
        let request = GenerationRequest::new(
            "gemini-2.0-flash",
            vec![HistoryEntry::user("Hi"), HistoryEntry::model("Hello!")],
        )
        .with_system_prompt("Be kind.");

        let payload = client().with_google_search(true).build_payload(&request, false);
        assert_eq!(payload["contents"][0]["role"], "user");
        assert_eq!(payload["contents"][1]["role"], ApiRole::Model.as_str());
        assert_eq!(payload["contents"][1]["parts"][0]["text"], "Hello!");
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "Be kind.");
        // Grounding only applies to streaming calls
        assert!(payload.get("tools").is_none());

        let payload = client().with_google_search(true).build_payload(&request, true);
        assert!(payload["tools"][0].get("google_search").is_some());
    }

    #[test]
    fn test_parse_sse_line() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert_eq!(parse_sse_line(chunk("Hi").trim()).unwrap().unwrap(), "Hi");

        let err = parse_sse_line(r#"data: {"error": {"code": 429, "message": "quota"}}"#)
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ChatError::Generation(ref m) if m == "quota"));
    }

    #[test]
    fn test_blocked_prompt_is_error() {
        let line = r#"data: {"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_sse_line(line).unwrap().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_lines() {
        let first = chunk("Hello");
        let (a, b) = first.split_at(10);
        let items = collect(vec![a.to_string(), b.to_string(), chunk(", world")]).await;
        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hello", ", world"]);
    }

    #[tokio::test]
    async fn test_stream_handles_missing_trailing_newline() {
        let last = chunk("tail");
        let items = collect(vec![last.trim_end().to_string()]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "tail");
    }

    #[tokio::test]
    async fn test_stream_stops_after_error() {
        let items = collect(vec![
            chunk("partial"),
            "data: {not json}\n".to_string(),
            chunk("never seen"),
        ])
        .await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
