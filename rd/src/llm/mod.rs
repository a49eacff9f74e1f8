//! LLM adapter
//!
//! The engine core only needs two things from a provider: build a request
//! from per-node history, and stream the response back as text chunks.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use client::{LlmClient, mock};
pub use error::LlmError;
pub use types::{CompletionRequest, HistoryMessage, StreamChunk};

use crate::config::LlmConfig;

/// Create an LLM client for the provider named in config.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{}'. Supported: anthropic",
            other
        ))),
    }
}
