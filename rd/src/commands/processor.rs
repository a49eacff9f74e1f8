//! Command dispatcher
//!
//! Executes the commands parsed from one LLM message in order, applying the
//! finish/fail gating and last-in-message policies, and funnels every error
//! into the node's next auto-reply.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::research::Research;
use crate::research::node::ResearchNode;

use super::command::CommandRegistry;
use super::context::CommandContext;
use super::parser::{generate_error_report, parse_text};

/// Literal substring that requests engine shutdown when it appears anywhere
/// in a response.
pub const SHUTDOWN_SENTINEL: &str = "SHUT_DOWN_DEEP_RESEARCHER";

/// Signal returned by command processing that the engine must act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    ShutdownRequested,
}

const CONFIRMATION_MESSAGE: &str = "You attempted to finish or fail the current problem, but there were errors \
in your message (see report below).\n\
Please review the errors. If you still want to finish/fail the problem, \
resend the `finish_problem` or `fail_problem` command **without** the errors.\n\
Otherwise, correct the errors and continue working on the problem.";

#[derive(Debug)]
struct ExecutionNote {
    name: String,
    status: String,
    line: Option<usize>,
}

pub struct CommandProcessor<'a> {
    registry: &'a CommandRegistry,
}

impl<'a> CommandProcessor<'a> {
    pub fn new(registry: &'a CommandRegistry) -> Self {
        Self { registry }
    }

    /// Parse and execute every command in `text` against `node`. Errors are
    /// reported through the node's aggregator; the only hard signal is the
    /// shutdown sentinel.
    pub fn process(&self, text: &str, node: &Arc<ResearchNode>, research: &Arc<Research>) -> Result<(), EngineSignal> {
        if text.to_lowercase().contains(&SHUTDOWN_SENTINEL.to_lowercase()) {
            warn!(node = %node.title(), "shutdown sentinel found in response");
            return Err(EngineSignal::ShutdownRequested);
        }

        let results = parse_text(self.registry, text);
        let parsing_report = generate_error_report(&results);
        let has_parsing_errors = !parsing_report.is_empty();

        let ctx = CommandContext::new(node.clone(), research.clone());
        let mut notes: Vec<ExecutionNote> = Vec::new();
        let mut any_failed = false;
        let mut finish_or_fail_skipped = false;
        let mut last_command_reached = false;

        for result in &results {
            if result.has_errors() {
                continue;
            }
            let Some(name) = result.command_name.as_deref() else {
                continue;
            };
            let Some(command) = self.registry.get(name) else {
                continue;
            };

            if last_command_reached {
                notes.push(ExecutionNote {
                    name: name.to_string(),
                    status: "skipped: came after a command that has to be the last in the message".to_string(),
                    line: result.block_start_line,
                });
                continue;
            }

            let is_terminal_command = matches!(name, "finish_problem" | "fail_problem");
            if is_terminal_command && (has_parsing_errors || any_failed) {
                finish_or_fail_skipped = true;
                notes.push(ExecutionNote {
                    name: name.to_string(),
                    status: "skipped: other errors detected in the message, do you really want to go ahead?"
                        .to_string(),
                    line: result.block_start_line,
                });
                continue;
            }

            match command.execute(&ctx, &result.args) {
                Ok(()) => {
                    debug!(command = name, "command executed");
                    if command.is_last_in_message() {
                        last_command_reached = true;
                    }
                }
                Err(e) => {
                    warn!(command = name, error = %e, "command execution failed");
                    any_failed = true;
                    notes.push(ExecutionNote {
                        name: name.to_string(),
                        status: format!("failed: {}", e),
                        line: result.block_start_line,
                    });
                }
            }
        }

        let final_report = build_error_report(&parsing_report, &notes);

        let mut history = node.history();
        let aggregator = history.aggregator_mut();
        if finish_or_fail_skipped {
            aggregator.add_confirmation_request(CONFIRMATION_MESSAGE);
        }
        if !final_report.is_empty() {
            aggregator.add_error_report(final_report);
        }
        Ok(())
    }
}

/// Combine parsing and execution errors into one report for the auto-reply.
fn build_error_report(parsing_report: &str, notes: &[ExecutionNote]) -> String {
    if parsing_report.is_empty() && notes.is_empty() {
        return String::new();
    }

    let mut report = parsing_report.to_string();

    if !notes.is_empty() {
        let mut lines = vec!["### Execution Status Report:".to_string()];
        for note in notes {
            let line_info = note.line.map(|n| format!(" at line {}", n)).unwrap_or_default();
            lines.push(format!("- Command '{}'{} {}", note.name, line_info, note.status));
        }
        let execution_report = lines.join("\n");

        if report.is_empty() {
            report = execution_report;
        } else {
            report.push_str("\n---\n");
            report.push_str(&execution_report);
        }
    }

    if !report.contains("### Command Parsing Errors Report:") && !report.contains("### Execution Status Report:") {
        report = format!("### Errors report:\n{}", report);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::state::ProblemStatus;
    use tempfile::tempdir;

    fn setup(temp: &tempfile::TempDir) -> (Arc<Research>, Arc<ResearchNode>, CommandRegistry) {
        let research = Research::create(temp.path(), "proc-test").unwrap();
        let root = research.define_root_problem("instruction").unwrap();
        (research, root, CommandRegistry::standard())
    }

    fn compiled_reply(node: &Arc<ResearchNode>) -> crate::research::history::AutoReply {
        let history = node.history();
        history.aggregator().compile()
    }

    #[test]
    fn test_shutdown_sentinel_short_circuits() {
        let temp = tempdir().unwrap();
        let (research, root, registry) = setup(&temp);
        let processor = CommandProcessor::new(&registry);

        let result = processor.process("I must shut_down_deep_researcher now", &root, &research);
        assert_eq!(result, Err(EngineSignal::ShutdownRequested));
    }

    #[test]
    fn test_successful_command_queues_output() {
        let temp = tempdir().unwrap();
        let (research, root, registry) = setup(&temp);
        let processor = CommandProcessor::new(&registry);

        processor
            .process("<<< add_criteria\n///criteria\nCover Q3\n>>>", &root, &research)
            .unwrap();

        assert_eq!(root.criteria_total_count(), 1);
        let reply = compiled_reply(&root);
        assert_eq!(reply.command_outputs.len(), 1);
        assert_eq!(reply.command_outputs[0].name, "add_criteria");
        assert!(reply.error_report.is_empty());
    }

    #[test]
    fn test_finish_gated_by_parse_errors() {
        let temp = tempdir().unwrap();
        let (research, root, registry) = setup(&temp);
        let processor = CommandProcessor::new(&registry);

        let text = "<<< unknown_cmd\n///x\ny\n>>>\n<<< finish_problem\n>>>";
        processor.process(text, &root, &research).unwrap();

        assert_eq!(root.status(), ProblemStatus::Created, "finish must be skipped");
        let reply = compiled_reply(&root);
        assert!(reply.confirmation_request.is_some());
        assert!(reply.error_report.contains("other errors detected in the message"));
        assert!(reply.error_report.contains("Unknown command"));
    }

    #[test]
    fn test_finish_gated_by_execution_errors() {
        let temp = tempdir().unwrap();
        let (research, root, registry) = setup(&temp);
        let processor = CommandProcessor::new(&registry);

        // cancel of a missing subproblem fails, gating the finish
        let text = "<<< cancel_subproblem\n///title\nghost\n>>>\n<<< finish_problem\n>>>";
        processor.process(text, &root, &research).unwrap();

        assert_eq!(root.status(), ProblemStatus::Created);
        let reply = compiled_reply(&root);
        assert!(reply.error_report.contains("failed: Subproblem 'ghost' not found"));
        assert!(reply.confirmation_request.is_some());
    }

    #[test]
    fn test_commands_after_terminal_are_skipped() {
        let temp = tempdir().unwrap();
        let (research, root, registry) = setup(&temp);
        let processor = CommandProcessor::new(&registry);

        let text = "<<< finish_problem\n>>>\n<<< add_criteria\n///criteria\ntoo late\n>>>";
        processor.process(text, &root, &research).unwrap();

        assert_eq!(root.status(), ProblemStatus::Finished);
        assert_eq!(root.criteria_total_count(), 0);
        let reply = compiled_reply(&root);
        assert!(reply.error_report.contains("came after a command that has to be the last"));
    }

    #[test]
    fn test_failed_command_does_not_halt_cycle() {
        let temp = tempdir().unwrap();
        let (research, root, registry) = setup(&temp);
        let processor = CommandProcessor::new(&registry);

        let text = "<<< cancel_subproblem\n///title\nghost\n>>>\n<<< add_criteria\n///criteria\nstill runs\n>>>";
        processor.process(text, &root, &research).unwrap();

        assert_eq!(root.criteria_total_count(), 1);
        let reply = compiled_reply(&root);
        assert!(reply.error_report.contains("failed:"));
    }

    #[test]
    fn test_plain_text_produces_nothing() {
        let temp = tempdir().unwrap();
        let (research, root, registry) = setup(&temp);
        let processor = CommandProcessor::new(&registry);

        processor.process("No commands, just narration.", &root, &research).unwrap();
        assert!(root.history().aggregator().is_empty());
    }
}
