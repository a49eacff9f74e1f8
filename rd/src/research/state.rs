//! Per-node mutable state and the problem status machine
//!
//! Serialized as `node_state.json` alongside the node's problem definition.
//! A node found `IN_PROGRESS` on load was interrupted mid-run and is coerced
//! to `FAILED`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{StoreError, read_to_string, write_file};

/// Number of message iterations an artifact stays open before auto-close
pub const ARTIFACT_AUTO_CLOSE_ITERATIONS: u32 = 5;

/// Lifecycle status of a research node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemStatus {
    Created,
    ReadyToStart,
    Pending,
    InProgress,
    Finished,
    Failed,
    Cancelled,
}

impl ProblemStatus {
    /// Terminal set: no further scheduling once reached
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProblemStatus::Finished | ProblemStatus::Failed | ProblemStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProblemStatus::Created => "CREATED",
            ProblemStatus::ReadyToStart => "READY_TO_START",
            ProblemStatus::Pending => "PENDING",
            ProblemStatus::InProgress => "IN_PROGRESS",
            ProblemStatus::Finished => "FINISHED",
            ProblemStatus::Failed => "FAILED",
            ProblemStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ProblemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a research node: artifact visibility, status, pending children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: String,

    /// Artifact name -> open flag
    #[serde(default)]
    pub artifacts_status: BTreeMap<String, bool>,

    /// Iteration at which each open artifact was opened
    #[serde(default)]
    pub artifacts_open_iterations: BTreeMap<String, u32>,

    /// Message iteration counter, monotonically non-decreasing
    #[serde(default)]
    pub current_iteration: u32,

    pub problem_status: ProblemStatus,

    #[serde(default)]
    pub resolution_message: Option<String>,

    /// Ids of children this node is waiting on while `PENDING`
    #[serde(default)]
    pub pending_child_node_ids: BTreeSet<String>,
}

impl NodeState {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            artifacts_status: BTreeMap::new(),
            artifacts_open_iterations: BTreeMap::new(),
            current_iteration: 0,
            problem_status: ProblemStatus::Created,
            resolution_message: None,
            pending_child_node_ids: BTreeSet::new(),
        }
    }

    /// Update the status. Moving into a non-started state clears any stale
    /// resolution message.
    pub fn set_status(&mut self, status: ProblemStatus) {
        self.problem_status = status;
        if matches!(
            status,
            ProblemStatus::Created | ProblemStatus::ReadyToStart | ProblemStatus::InProgress
        ) {
            self.resolution_message = None;
        }
    }

    pub fn increment_iteration(&mut self) {
        self.current_iteration += 1;
    }

    /// Record an artifact's open/closed flag. Opening remembers the current
    /// iteration for auto-close; closing erases the marker.
    pub fn set_artifact_status(&mut self, name: &str, open: bool) {
        self.artifacts_status.insert(name.to_string(), open);
        if open {
            self.artifacts_open_iterations
                .insert(name.to_string(), self.current_iteration);
        } else {
            self.artifacts_open_iterations.remove(name);
        }
    }

    /// Visibility query with lazy auto-close: an artifact open for
    /// [`ARTIFACT_AUTO_CLOSE_ITERATIONS`] or more iterations reverts to
    /// closed. Unknown artifacts are closed.
    pub fn artifact_visibility(&mut self, name: &str) -> bool {
        if self.artifacts_status.get(name).copied().unwrap_or(false)
            && let Some(opened) = self.artifacts_open_iterations.get(name).copied()
            && self.current_iteration.saturating_sub(opened) >= ARTIFACT_AUTO_CLOSE_ITERATIONS
        {
            self.artifacts_status.insert(name.to_string(), false);
            self.artifacts_open_iterations.remove(name);
        }
        self.artifacts_status.get(name).copied().unwrap_or(false)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_file(path, &serde_json::to_string_pretty(self)?)
    }

    /// Load from disk. Returns `None` when the file does not exist yet; a
    /// crash-recovered `IN_PROGRESS` node comes back as `FAILED`.
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let mut state: NodeState = match serde_json::from_str(&read_to_string(path)?) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable node state, starting fresh");
                return Ok(None);
            }
        };
        if state.problem_status == ProblemStatus::InProgress {
            state.problem_status = ProblemStatus::Failed;
        }
        if state.id.is_empty() {
            state.id = uuid::Uuid::now_v7().to_string();
        }
        Ok(Some(state))
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}
