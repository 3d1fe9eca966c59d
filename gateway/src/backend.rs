//! Backend callers.
//!
//! The router talks to providers through the [`BackendCaller`] trait so
//! the whole routing pipeline can be exercised against a scripted mock.
//! The HTTP implementation speaks the OpenAI-compatible chat completions
//! shape that all four providers expose behind a gateway endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Message, ModelId};

/// A failed backend call, carrying everything the retry layer needs to
/// classify it.
#[derive(Debug, Clone)]
pub struct BackendFailure {
    /// Provider-supplied or transport error message.
    pub message: String,
    /// HTTP status code, when the failure got far enough to have one.
    pub status: Option<u16>,
    /// True when the call was abandoned at the gateway's timeout.
    pub timed_out: bool,
}

impl BackendFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            timed_out: false,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
            timed_out: false,
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self {
            message: format!("backend call exceeded {secs}s timeout"),
            status: None,
            timed_out: true,
        }
    }
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "backend failure (status {status}): {}", self.message),
            None => write!(f, "backend failure: {}", self.message),
        }
    }
}

impl std::error::Error for BackendFailure {}

/// A completed backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Model that produced the completion.
    pub model: ModelId,
    /// Completion text.
    pub content: String,
    /// Tokens the provider reported consuming, if any.
    pub tokens_used: Option<u64>,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
}

/// Abstraction over the provider wire call.
#[async_trait]
pub trait BackendCaller: Send + Sync {
    async fn call(
        &self,
        conversation: &[Message],
        model: ModelId,
    ) -> Result<BackendResponse, BackendFailure>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

/// HTTP caller hitting an OpenAI-compatible chat completions endpoint.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl BackendCaller for HttpBackend {
    async fn call(
        &self,
        conversation: &[Message],
        model: ModelId,
    ) -> Result<BackendResponse, BackendFailure> {
        let started = Instant::now();
        let request = ChatRequest {
            model: model.api_name(),
            messages: conversation,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendFailure::new(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(500).collect();
            return Err(BackendFailure::with_status(snippet, status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendFailure::new(format!("malformed response body: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendFailure::new("response contained no choices"))?;

        Ok(BackendResponse {
            model,
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Scripted backend for tests: returns queued results in order, records
/// every call it receives, and answers with a canned success once the
/// script runs dry.
pub struct MockBackend {
    script: Mutex<VecDeque<Result<String, BackendFailure>>>,
    calls: Mutex<Vec<(ModelId, usize)>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion.
    pub fn with_content(self, content: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(content.into()));
        }
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, failure: BackendFailure) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(failure));
        }
        self
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// The (model, conversation length) of every call, in order.
    pub fn calls(&self) -> Vec<(ModelId, usize)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BackendCaller for MockBackend {
    async fn call(
        &self,
        conversation: &[Message],
        model: ModelId,
    ) -> Result<BackendResponse, BackendFailure> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((model, conversation.len()));
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Err(failure)) => Err(failure),
            Some(Ok(content)) => Ok(BackendResponse {
                model,
                content,
                tokens_used: Some(conversation.len() as u64 * 10),
                latency_ms: 1,
            }),
            None => Ok(BackendResponse {
                model,
                content: "mock completion".to_string(),
                tokens_used: Some(conversation.len() as u64 * 10),
                latency_ms: 1,
            }),
        }
    }
}

/// Backend whose calls never resolve, for exercising the call timeout.
pub struct HangingBackend;

#[async_trait]
impl BackendCaller for HangingBackend {
    async fn call(
        &self,
        _conversation: &[Message],
        _model: ModelId,
    ) -> Result<BackendResponse, BackendFailure> {
        std::future::pending().await
    }
}

/// Backend that fails every call with a clone of one failure.
pub struct AlwaysFailingBackend {
    failure: BackendFailure,
}

impl AlwaysFailingBackend {
    pub fn new(failure: BackendFailure) -> Self {
        Self { failure }
    }
}

#[async_trait]
impl BackendCaller for AlwaysFailingBackend {
    async fn call(
        &self,
        _conversation: &[Message],
        _model: ModelId,
    ) -> Result<BackendResponse, BackendFailure> {
        Err(self.failure.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_plays_script_in_order() {
        let backend = MockBackend::new()
            .with_content("first")
            .with_failure(BackendFailure::with_status("overloaded", 503))
            .with_content("third");

        let convo = vec![Message::user("hi")];
        let one = backend.call(&convo, ModelId::Haiku).await;
        assert_eq!(one.unwrap().content, "first");
        let two = backend.call(&convo, ModelId::Haiku).await;
        assert_eq!(two.unwrap_err().status, Some(503));
        let three = backend.call(&convo, ModelId::Haiku).await;
        assert_eq!(three.unwrap().content, "third");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_defaults_after_script() {
        let backend = MockBackend::new();
        let convo = vec![Message::user("hi")];
        let result = backend.call(&convo, ModelId::Opus).await;
        assert!(result.is_ok());
        assert_eq!(backend.calls(), vec![(ModelId::Opus, 1)]);
    }

    #[tokio::test]
    async fn test_always_failing() {
        let backend = AlwaysFailingBackend::new(BackendFailure::timeout(120));
        let convo = vec![Message::user("hi")];
        let err = backend.call(&convo, ModelId::Opus).await.unwrap_err();
        assert!(err.timed_out);
        let err = backend.call(&convo, ModelId::Sonnet).await.unwrap_err();
        assert!(err.timed_out);
    }

    #[test]
    fn test_failure_display() {
        let plain = BackendFailure::new("connection refused");
        assert_eq!(plain.to_string(), "backend failure: connection refused");
        let status = BackendFailure::with_status("bad request", 400);
        assert_eq!(
            status.to_string(),
            "backend failure (status 400): bad request"
        );
    }
}
