//! Per-node conversation history with the transactional auto-reply buffer
//!
//! The history is an ordered list of blocks persisted as `history.json`.
//! The aggregator is a scratch buffer collecting everything destined for the
//! next auto-reply; a cycle seals it into a tentative [`AutoReply`] block
//! which is either committed together with the assistant's message or rolled
//! back, leaving both history and aggregator untouched.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{StoreError, read_to_string, write_file};

use super::sections::DynamicSectionData;

/// A dynamic section snapshot pinned to its slot in the interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSlot {
    pub index: usize,
    pub data: DynamicSectionData,
}

/// Output of one executed command, echoed back to the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub name: String,
    pub args: serde_json::Value,
    pub output: String,
}

/// A message delivered into this node's next auto-reply by another node or
/// by the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalMessage {
    pub content: String,
    pub source: String,
}

/// The structured system message prepended to an LLM turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoReply {
    #[serde(default)]
    pub error_report: String,
    #[serde(default)]
    pub command_outputs: Vec<CommandOutput>,
    #[serde(default)]
    pub messages: Vec<InternalMessage>,
    #[serde(default)]
    pub confirmation_request: Option<String>,
    #[serde(default)]
    pub dynamic_sections: Vec<SectionSlot>,
}

/// One entry of a node's conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HistoryBlock {
    ChatMessage {
        author: String,
        content: String,
    },
    InitialInterface {
        static_content: String,
        dynamic_sections: Vec<SectionSlot>,
    },
    AutoReply(AutoReply),
}

/// Scratch buffer for the next auto-reply.
///
/// `compile` is non-destructive; `clear` drops the pending data but keeps
/// the last observed dynamic-section state so the next diff has a baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoReplyAggregator {
    #[serde(default)]
    error_reports: Vec<String>,
    #[serde(default)]
    command_outputs: Vec<CommandOutput>,
    #[serde(default)]
    internal_messages: Vec<InternalMessage>,
    #[serde(default)]
    confirmation_requests: Vec<String>,
    #[serde(default)]
    dynamic_sections_to_report: Vec<SectionSlot>,
    #[serde(default)]
    last_dynamic_sections_state: Vec<DynamicSectionData>,
}

impl AutoReplyAggregator {
    pub fn add_error_report(&mut self, report: impl Into<String>) {
        self.error_reports.push(report.into());
    }

    pub fn add_confirmation_request(&mut self, message: impl Into<String>) {
        self.confirmation_requests.push(message.into());
    }

    pub fn add_command_output(&mut self, name: impl Into<String>, args: serde_json::Value, output: impl Into<String>) {
        self.command_outputs.push(CommandOutput {
            name: name.into(),
            args,
            output: output.into(),
        });
    }

    pub fn add_internal_message_from(&mut self, content: impl Into<String>, source: impl Into<String>) {
        self.internal_messages.push(InternalMessage {
            content: content.into(),
            source: source.into(),
        });
    }

    /// Diff a fresh snapshot of all dynamic sections against the last
    /// observed state. Changed (or structurally added/removed) sections are
    /// queued for this turn's auto-reply; the snapshot becomes the new
    /// baseline. The first snapshot initializes the baseline silently.
    pub fn update_dynamic_sections(&mut self, snapshot: Vec<DynamicSectionData>) {
        if self.last_dynamic_sections_state.is_empty() {
            self.last_dynamic_sections_state = snapshot;
            self.dynamic_sections_to_report = Vec::new();
            return;
        }

        if snapshot.len() != self.last_dynamic_sections_state.len() {
            warn!("dynamic section count changed, re-evaluating all");
        }

        self.dynamic_sections_to_report = snapshot
            .iter()
            .enumerate()
            .filter(|(i, data)| self.last_dynamic_sections_state.get(*i) != Some(data))
            .map(|(index, data)| SectionSlot {
                index,
                data: data.clone(),
            })
            .collect();

        self.last_dynamic_sections_state = snapshot;
    }

    /// Baseline used by the initial interface so the first turn does not
    /// re-report unchanged sections.
    pub fn set_initial_dynamic_state(&mut self, sections: &[SectionSlot]) {
        if self.last_dynamic_sections_state.is_empty() {
            self.last_dynamic_sections_state = sections.iter().map(|s| s.data.clone()).collect();
        }
    }

    pub fn last_dynamic_state(&self) -> &[DynamicSectionData] {
        &self.last_dynamic_sections_state
    }

    pub fn is_empty(&self) -> bool {
        self.error_reports.is_empty()
            && self.command_outputs.is_empty()
            && self.internal_messages.is_empty()
            && self.confirmation_requests.is_empty()
            && self.dynamic_sections_to_report.is_empty()
    }

    /// Compile the pending data into an [`AutoReply`] without clearing.
    pub fn compile(&self) -> AutoReply {
        AutoReply {
            error_report: self.error_reports.join("\n"),
            command_outputs: self.command_outputs.clone(),
            messages: self.internal_messages.clone(),
            confirmation_request: if self.confirmation_requests.is_empty() {
                None
            } else {
                Some(self.confirmation_requests.join("\n"))
            },
            dynamic_sections: self.dynamic_sections_to_report.clone(),
        }
    }

    /// Discard pending data, keeping the dynamic-section baseline.
    pub fn clear(&mut self) {
        self.error_reports.clear();
        self.command_outputs.clear();
        self.internal_messages.clear();
        self.confirmation_requests.clear();
        self.dynamic_sections_to_report.clear();
    }
}

/// Persisted form: blocks plus the aggregator scratch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryFile {
    blocks: Vec<HistoryBlock>,
    aggregator: AutoReplyAggregator,
}

/// The conversation history of a single node
#[derive(Debug)]
pub struct NodeHistory {
    blocks: Vec<HistoryBlock>,
    aggregator: AutoReplyAggregator,
    path: PathBuf,
}

impl NodeHistory {
    /// Open the history at `path`, loading it if present. An unreadable
    /// file starts the history fresh rather than failing the node.
    pub fn open(path: PathBuf) -> Self {
        let mut history = Self {
            blocks: Vec::new(),
            aggregator: AutoReplyAggregator::default(),
            path,
        };
        if history.path.exists() {
            match read_to_string(&history.path)
                .and_then(|raw| serde_json::from_str::<HistoryFile>(&raw).map_err(StoreError::from))
            {
                Ok(file) => {
                    history.blocks = file.blocks;
                    history.aggregator = file.aggregator;
                }
                Err(e) => warn!(path = %history.path.display(), error = %e, "unreadable history, starting fresh"),
            }
        }
        history
    }

    pub fn blocks(&self) -> &[HistoryBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn aggregator(&self) -> &AutoReplyAggregator {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut AutoReplyAggregator {
        &mut self.aggregator
    }

    pub fn add_message(&mut self, author: impl Into<String>, content: impl Into<String>) -> Result<(), StoreError> {
        self.blocks.push(HistoryBlock::ChatMessage {
            author: author.into(),
            content: content.into(),
        });
        self.save()
    }

    pub fn has_initial_interface(&self) -> bool {
        matches!(self.blocks.first(), Some(HistoryBlock::InitialInterface { .. }))
    }

    /// Install the initial interface block at the front, once. Also seeds
    /// the aggregator's dynamic-section baseline.
    pub fn set_initial_interface(
        &mut self,
        static_content: String,
        dynamic_data: Vec<DynamicSectionData>,
    ) -> Result<(), StoreError> {
        if self.has_initial_interface() {
            return Ok(());
        }
        let sections: Vec<SectionSlot> = dynamic_data
            .into_iter()
            .enumerate()
            .map(|(index, data)| SectionSlot { index, data })
            .collect();
        self.aggregator.set_initial_dynamic_state(&sections);
        self.blocks.insert(
            0,
            HistoryBlock::InitialInterface {
                static_content,
                dynamic_sections: sections,
            },
        );
        self.save()
    }

    /// Refresh the static part of the initial interface in place (budget
    /// counters and similar live there).
    pub fn update_static_content(&mut self, content: String) {
        if let Some(HistoryBlock::InitialInterface { static_content, .. }) = self.blocks.first_mut() {
            *static_content = content;
        }
    }

    /// Seal the current aggregator into a tentative [`AutoReply`] block.
    /// The aggregator is NOT cleared: this is the unit of rollback. Nothing
    /// is appended when the aggregator has nothing to report.
    pub fn prepare_and_add_auto_reply_block(&mut self) {
        if self.aggregator.is_empty() {
            return;
        }
        let reply = self.aggregator.compile();
        self.blocks.push(HistoryBlock::AutoReply(reply));
    }

    /// Remove the tentative auto-reply after a failed LLM call.
    pub fn rollback_last_auto_reply(&mut self) {
        if matches!(self.blocks.last(), Some(HistoryBlock::AutoReply(_))) {
            self.blocks.pop();
        }
    }

    /// Finalize the transaction: clear the scratch and append the
    /// assistant's message, persisting the whole history.
    pub fn commit_llm_turn(&mut self, response: impl Into<String>) -> Result<(), StoreError> {
        self.aggregator.clear();
        self.add_message("assistant", response)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let file = HistoryFile {
            blocks: self.blocks.clone(),
            aggregator: self.aggregator.clone(),
        };
        write_file(&self.path, &serde_json::to_string_pretty(&file)?)
    }
}
