//! LLM request types
//!
//! Modeled on the Anthropic Messages API but provider-agnostic: a request
//! is a flat list of authored messages plus a token ceiling.

use serde::{Deserialize, Serialize};

/// One history entry handed to `build_request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub author: String,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }
}

/// Everything needed for one LLM call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<HistoryMessage>,
    pub max_tokens: u32,
}

/// Streaming chunk delivered while a response is generated
#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextDelta(String),
    Done,
}
