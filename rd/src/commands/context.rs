//! Execution context handed to commands
//!
//! Gives built-ins access to the current node, the research project, the
//! shared knowledge base, and the scheduling hooks (activate / wait /
//! finish / fail) without coupling them to the task processor.

use std::sync::Arc;

use tracing::debug;

use crate::research::Research;
use crate::research::artifact::Artifact;
use crate::research::knowledge::KnowledgeBase;
use crate::research::node::ResearchNode;
use crate::research::state::ProblemStatus;

use super::command::CommandArgs;

pub struct CommandContext {
    node: Arc<ResearchNode>,
    research: Arc<Research>,
}

impl CommandContext {
    pub fn new(node: Arc<ResearchNode>, research: Arc<Research>) -> Self {
        Self { node, research }
    }

    pub fn current_node(&self) -> &Arc<ResearchNode> {
        &self.node
    }

    pub fn research(&self) -> &Arc<Research> {
        &self.research
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        self.research.knowledge_base()
    }

    /// Queue a command's confirmation output into the node's next
    /// auto-reply.
    pub fn add_command_output(&self, command_name: &str, args: &CommandArgs, output: impl Into<String>) {
        self.node
            .history()
            .aggregator_mut()
            .add_command_output(command_name, args.to_json(), output);
    }

    pub fn add_to_permanent_log(&self, content: &str) {
        if !content.is_empty() {
            self.research.permanent_logs().add_log(content);
        }
    }

    /// Name-substring search over this research's artifacts.
    pub fn search_artifacts(&self, name: &str) -> Vec<(Arc<ResearchNode>, Artifact)> {
        self.research.search_artifacts(name)
    }

    /// Mark a child ready for a worker. Idempotent against a child that is
    /// already running.
    pub fn activate_subtask(&self, subproblem_title: &str) -> bool {
        let Some(child) = self.node.child_by_title(subproblem_title) else {
            return false;
        };
        if child.status() == ProblemStatus::InProgress {
            return true;
        }
        child.set_status(ProblemStatus::ReadyToStart);
        true
    }

    /// Register a child in the pending set; the current node transitions to
    /// `PENDING`.
    pub fn wait_for_subtask(&self, subproblem_title: &str) {
        let Some(child) = self.node.child_by_title(subproblem_title) else {
            return;
        };
        let child_id = child.id();
        self.node.add_pending_child(&child_id);
    }

    /// Mark the current node `FINISHED`. The root stores the message as its
    /// resolution; other nodes notify the parent's aggregator.
    pub fn finish_node(&self, message: Option<&str>) {
        self.conclude_node(ProblemStatus::Finished, "Task marked FINISHED, focusing back up.", "[Completion Message]: ", message);
    }

    /// Mirror of [`finish_node`] with `FAILED`.
    pub fn fail_node(&self, message: Option<&str>) {
        self.conclude_node(ProblemStatus::Failed, "Task marked FAILED, focusing back up.", "[Failure Message]: ", message);
    }

    fn conclude_node(&self, status: ProblemStatus, status_msg: &str, prefix: &str, message: Option<&str>) {
        let parent = self.node.parent();
        self.node.set_status(status);
        debug!(node = %self.node.title(), %status, "node concluded");

        match parent {
            None => self.node.set_resolution_message(message.map(str::to_string)),
            Some(parent) => {
                let mut history = parent.history();
                let aggregator = history.aggregator_mut();
                aggregator.add_internal_message_from(status_msg, self.node.title());
                if let Some(message) = message {
                    aggregator.add_internal_message_from(format!("{}{}", prefix, message), self.node.title());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::Research;
    use tempfile::tempdir;

    fn context(temp: &tempfile::TempDir) -> CommandContext {
        let research = Research::create(temp.path(), "ctx-test").unwrap();
        let root = research.define_root_problem("investigate").unwrap();
        CommandContext::new(root, research)
    }

    #[test]
    fn test_activate_missing_child_is_false() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        assert!(!ctx.activate_subtask("nope"));
    }

    #[test]
    fn test_activate_sets_ready_and_is_idempotent_for_running() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let child = ctx.current_node().create_child("C", "c").unwrap();

        assert!(ctx.activate_subtask("C"));
        assert_eq!(child.status(), ProblemStatus::ReadyToStart);

        child.set_status(ProblemStatus::InProgress);
        assert!(ctx.activate_subtask("C"));
        assert_eq!(child.status(), ProblemStatus::InProgress);
    }

    #[test]
    fn test_wait_marks_parent_pending() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let child = ctx.current_node().create_child("C", "c").unwrap();

        ctx.wait_for_subtask("C");
        assert_eq!(ctx.current_node().status(), ProblemStatus::Pending);
        assert!(
            ctx.current_node()
                .node_state()
                .pending_child_node_ids
                .contains(&child.id())
        );
    }

    #[test]
    fn test_finish_root_stores_resolution() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);

        ctx.finish_node(Some("all wrapped up"));
        assert_eq!(ctx.current_node().status(), ProblemStatus::Finished);
        assert_eq!(ctx.current_node().resolution_message().as_deref(), Some("all wrapped up"));
    }

    #[test]
    fn test_finish_child_notifies_parent_aggregator() {
        let temp = tempdir().unwrap();
        let research = Research::create(temp.path(), "ctx-test").unwrap();
        let root = research.define_root_problem("investigate").unwrap();
        let child = root.create_child("C", "c").unwrap();
        let ctx = CommandContext::new(child.clone(), research);

        ctx.finish_node(Some("done my part"));

        assert_eq!(child.status(), ProblemStatus::Finished);
        let history = root.history();
        let reply = history.aggregator().compile();
        assert_eq!(reply.messages.len(), 2);
        assert!(reply.messages[0].content.contains("FINISHED"));
        assert_eq!(reply.messages[0].source, "C");
        assert!(reply.messages[1].content.contains("[Completion Message]: done my part"));
    }
}
