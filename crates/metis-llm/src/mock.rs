//! Mock LLM provider for testing
//!
//! Returns scripted responses in FIFO order, one queue per completion
//! style, so tests can drive the engine deterministically.

use crate::completion::{
    CompletionRequest, CompletionResponse, ToolCompletionRequest, ToolCompletionResponse,
};
use crate::error::Result;
use crate::provider::{LlmProvider, TokenStream};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A mock LLM provider that returns queued responses or default empty ones.
pub struct MockProvider {
    completions: Arc<Mutex<VecDeque<String>>>,
    tool_responses: Arc<Mutex<VecDeque<ToolCompletionResponse>>>,
    streams: Arc<Mutex<VecDeque<Vec<String>>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self {
            completions: Arc::new(Mutex::new(VecDeque::new())),
            tool_responses: Arc::new(Mutex::new(VecDeque::new())),
            streams: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue a plain completion response.
    pub fn add_completion(&self, content: impl Into<String>) {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(content.into());
    }

    /// Queue a tool completion response.
    pub fn add_tool_response(&self, response: ToolCompletionResponse) {
        self.tool_responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Queue a tool completion response that is plain text (no tool calls).
    pub fn add_tool_text(&self, content: impl Into<String>) {
        self.add_tool_response(ToolCompletionResponse {
            content: Some(content.into()),
            tool_calls: vec![],
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: "mock-model".to_string(),
        });
    }

    /// Queue a streamed completion as a token script.
    ///
    /// An empty script simulates a stream that yields no tokens.
    pub fn add_stream<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(tokens.into_iter().map(Into::into).collect());
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        let content = self
            .completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| "mock response".to_string());

        Ok(CompletionResponse {
            content,
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: "mock-model".to_string(),
        })
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse> {
        let mut responses = self.tool_responses.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(resp) = responses.pop_front() {
            Ok(resp)
        } else {
            Ok(ToolCompletionResponse {
                content: Some("mock response".to_string()),
                tool_calls: vec![],
                usage: None,
                finish_reason: Some("stop".to_string()),
                model: "mock-model".to_string(),
            })
        }
    }

    async fn complete_stream(&self, _request: CompletionRequest) -> Result<TokenStream> {
        let tokens = self
            .streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();

        Ok(Box::pin(futures::stream::iter(
            tokens.into_iter().map(Ok),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_queued_completion() {
        let provider = MockProvider::new();
        provider.add_completion("first");
        provider.add_completion("second");

        let r1 = provider.complete(CompletionRequest::new("m")).await.unwrap();
        let r2 = provider.complete(CompletionRequest::new("m")).await.unwrap();
        let r3 = provider.complete(CompletionRequest::new("m")).await.unwrap();

        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
        assert_eq!(r3.content, "mock response");
    }

    #[tokio::test]
    async fn test_stream_script() {
        let provider = MockProvider::new();
        provider.add_stream(["Hel", "lo"]);

        let mut stream = provider
            .complete_stream(CompletionRequest::new("m"))
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(tok) = stream.next().await {
            text.push_str(&tok.unwrap());
        }
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_empty_stream_queue_yields_nothing() {
        let provider = MockProvider::new();
        let mut stream = provider
            .complete_stream(CompletionRequest::new("m"))
            .await
            .unwrap();
        assert!(stream.next().await.is_none());
    }
}
