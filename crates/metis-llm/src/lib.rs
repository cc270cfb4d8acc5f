//! Metis LLM - completion service abstraction
//!
//! This crate provides the language-model seam for Metis:
//! - Provider: the [`LlmProvider`] trait (plain, tool-calling, and
//!   streamed completions)
//! - `OpenAiCompat`: a provider for any OpenAI-compatible chat endpoint
//!   (custom base URL, API key, model name)
//! - Mock: a scriptable provider for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod message;
pub mod mock;
pub mod openai_compat;
pub mod provider;
pub mod tools;

pub use completion::{
    CompletionRequest, CompletionResponse, TokenUsage, ToolCompletionRequest,
    ToolCompletionResponse,
};
pub use error::{Error, Result};
pub use message::{Message, MessageRole};
pub use mock::MockProvider;
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use provider::{LlmProvider, TokenStream};
pub use tools::{ToolCall, ToolChoice, ToolDefinition};
