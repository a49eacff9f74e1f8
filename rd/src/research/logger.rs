//! Per-node LLM request/response dumps
//!
//! Every turn writes the outgoing request and the raw response under the
//! node's `logs_and_debug/` directory so a run can be replayed by hand.

use std::path::PathBuf;

use tracing::warn;

use crate::store::write_file;

pub const DEBUG_LOGS_DIR: &str = "logs_and_debug";

#[derive(Debug, Clone)]
pub struct NodeLogger {
    dir: PathBuf,
}

impl NodeLogger {
    pub fn new(node_path: &std::path::Path) -> Self {
        Self {
            dir: node_path.join(DEBUG_LOGS_DIR),
        }
    }

    pub fn log_llm_request(&self, turn: u32, request: &serde_json::Value) {
        let path = self.dir.join(format!("turn_{:04}_request.json", turn));
        let body = serde_json::to_string_pretty(request).unwrap_or_else(|_| request.to_string());
        if let Err(e) = write_file(&path, &body) {
            warn!(path = %path.display(), error = %e, "failed to dump LLM request");
        }
    }

    pub fn log_llm_response(&self, turn: u32, response: &str) {
        let path = self.dir.join(format!("turn_{:04}_response.md", turn));
        if let Err(e) = write_file(&path, response) {
            warn!(path = %path.display(), error = %e, "failed to dump LLM response");
        }
    }
}
