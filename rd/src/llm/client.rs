//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, HistoryMessage, LlmError, StreamChunk};

/// Provider adapter for the research engine.
///
/// The engine builds one request per cycle from the node's full history and
/// consumes the response as a stream of text chunks, checking for
/// cancellation between chunks. Providers are stateless between calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Assemble a provider request from chronological history messages.
    fn build_request(&self, history: &[HistoryMessage]) -> CompletionRequest;

    /// Stream the response, sending chunks into `chunk_tx` until done.
    /// Dropping the receiver cancels the stream.
    async fn stream(&self, request: CompletionRequest, chunk_tx: mpsc::Sender<StreamChunk>) -> Result<(), LlmError>;
}

/// Scripted LLM double for tests and dry runs.
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// One scripted turn of the mock client
    #[derive(Debug, Clone)]
    pub enum ScriptedTurn {
        /// Stream this text (split into a few chunks)
        Respond(String),
        /// Fail the call with a 500-class API error
        Fail(String),
    }

    pub struct MockLlmClient {
        script: Mutex<VecDeque<ScriptedTurn>>,
        call_count: AtomicUsize,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(turns: Vec<ScriptedTurn>) -> Self {
            Self {
                script: Mutex::new(turns.into()),
                call_count: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        /// Convenience constructor for all-success scripts
        pub fn with_responses(responses: Vec<&str>) -> Self {
            Self::new(responses.into_iter().map(|r| ScriptedTurn::Respond(r.to_string())).collect())
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<CompletionRequest> {
            self.last_request.lock().expect("mock lock poisoned").clone()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        fn build_request(&self, history: &[HistoryMessage]) -> CompletionRequest {
            CompletionRequest {
                model: "mock".to_string(),
                messages: history.to_vec(),
                max_tokens: 4096,
            }
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<(), LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("mock lock poisoned") = Some(request);

            let turn = self
                .script
                .lock()
                .expect("mock lock poisoned")
                .pop_front()
                .ok_or_else(|| LlmError::InvalidResponse("No more mock responses".to_string()))?;

            match turn {
                ScriptedTurn::Respond(text) => {
                    let midpoint = text.len() / 2;
                    let midpoint = (0..=midpoint).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
                    let (head, tail) = text.split_at(midpoint);
                    for piece in [head, tail] {
                        if !piece.is_empty() {
                            let _ = chunk_tx.send(StreamChunk::TextDelta(piece.to_string())).await;
                        }
                    }
                    let _ = chunk_tx.send(StreamChunk::Done).await;
                    Ok(())
                }
                ScriptedTurn::Fail(message) => Err(LlmError::ApiError {
                    status: 500,
                    message,
                }),
            }
        }
    }

}
