//! Anthropic Claude API client implementation
//!
//! Implements the [`LlmClient`] trait over the Messages API with SSE
//! streaming. History authors map onto API roles; adjacent messages with
//! the same role are merged because the API requires alternation.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::LlmConfig;

use super::{CompletionRequest, HistoryMessage, LlmError, StreamChunk};
use super::client::LlmClient;

pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a client from configuration, reading the API key from the
    /// environment variable named there.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": convert_messages(&request.messages),
            "stream": true,
        })
    }
}

/// Map history authors to API roles and merge adjacent same-role messages.
fn convert_messages(messages: &[HistoryMessage]) -> Vec<serde_json::Value> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for message in messages {
        let role = if message.author == "assistant" { "assistant" } else { "user" };
        match merged.last_mut() {
            Some((last_role, content)) if last_role == role => {
                content.push_str("\n\n");
                content.push_str(&message.content);
            }
            _ => merged.push((role.to_string(), message.content.clone())),
        }
    }
    merged
        .into_iter()
        .map(|(role, content)| serde_json::json!({"role": role, "content": content}))
        .collect()
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn build_request(&self, history: &[HistoryMessage]) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: history.to_vec(),
            max_tokens: self.max_tokens,
        }
    }

    async fn stream(&self, request: CompletionRequest, chunk_tx: mpsc::Sender<StreamChunk>) -> Result<(), LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);

        let http_request = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body);

        let mut es = EventSource::new(http_request).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    let data: serde_json::Value = serde_json::from_str(&msg.data).map_err(LlmError::Json)?;
                    match data["type"].as_str() {
                        Some("content_block_delta") => {
                            if let Some(text) = data["delta"]["text"].as_str() {
                                let delta = StreamChunk::TextDelta(text.to_string());
                                if chunk_tx.send(delta).await.is_err() {
                                    debug!("chunk receiver dropped, cancelling stream");
                                    es.close();
                                    return Ok(());
                                }
                            }
                        }
                        Some("message_stop") => {
                            break;
                        }
                        Some("error") => {
                            let message = data["error"]["message"].as_str().unwrap_or("unknown").to_string();
                            es.close();
                            return Err(LlmError::InvalidResponse(message));
                        }
                        _ => {}
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    es.close();
                    if status.as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(60);
                        return Err(LlmError::RateLimited {
                            retry_after: Duration::from_secs(retry_after),
                        });
                    }
                    let message = response.text().await.unwrap_or_default();
                    return Err(LlmError::ApiError {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    es.close();
                    return Err(LlmError::InvalidResponse(e.to_string()));
                }
            }
        }

        let _ = chunk_tx.send(StreamChunk::Done).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_merges_adjacent_roles() {
        let messages = vec![
            HistoryMessage::new("user", "interface"),
            HistoryMessage::new("user", "auto-reply"),
            HistoryMessage::new("assistant", "answer"),
        ];
        let converted = convert_messages(&messages);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0]["role"], "user");
        assert!(converted[0]["content"].as_str().unwrap().contains("interface"));
        assert!(converted[0]["content"].as_str().unwrap().contains("auto-reply"));
        assert_eq!(converted[1]["role"], "assistant");
    }

    #[test]
    fn test_unknown_authors_map_to_user() {
        let messages = vec![HistoryMessage::new("system", "note")];
        let converted = convert_messages(&messages);
        assert_eq!(converted[0]["role"], "user");
    }
}
