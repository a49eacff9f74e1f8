//! Task processor: one worker's LLM turn loop for a single node
//!
//! Each cycle: budget gate, iteration bump, interface render + section
//! diff, seal the aggregator into a tentative auto-reply, call the LLM,
//! then either commit (clear aggregator, append the assistant message) or
//! roll back, leaving history and aggregator exactly as they were. Command
//! dispatch runs after commit and feeds the next cycle's auto-reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::budget::BudgetManager;
use crate::commands::{CommandProcessor, CommandRegistry, EngineSignal};
use crate::llm::{CompletionRequest, LlmClient, LlmError, StreamChunk};
use crate::operator::{Operator, retry_blocking};
use crate::report::StatusPrinter;
use crate::research::Research;
use crate::research::interface::{collect_dynamic_data, render_static_interface};
use crate::research::node::ResearchNode;
use crate::research::render::history_messages;
use crate::research::state::ProblemStatus;

/// Outcome of running a node to completion or pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunResult {
    /// Node reached `FINISHED`, `FAILED` or `PENDING` (or was cancelled)
    CompletedOrPaused,
    /// Budget exhaustion, shutdown sentinel, or operator abort
    EngineStopRequested,
    /// Unexpected error; the node was forced `FAILED`
    TaskFailed,
}

enum CycleOutcome {
    Continue,
    Done(TaskRunResult),
}

enum CycleError {
    /// Node cancelled or engine interrupted mid-stream
    Cancelled,
    /// Shutdown sentinel in the response
    Shutdown,
    /// Operator declined the LLM retry prompt
    Aborted,
    /// Anything else; fails the node
    Fatal(eyre::Report),
}

impl From<eyre::Report> for CycleError {
    fn from(e: eyre::Report) -> Self {
        CycleError::Fatal(e)
    }
}

pub struct TaskProcessor {
    node: Arc<ResearchNode>,
    research: Arc<Research>,
    llm: Arc<dyn LlmClient>,
    registry: Arc<CommandRegistry>,
    budget: Arc<BudgetManager>,
    operator: Arc<dyn Operator>,
    engine_interrupted: Arc<AtomicBool>,
    status_printer: StatusPrinter,
}

impl TaskProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: Arc<ResearchNode>,
        research: Arc<Research>,
        llm: Arc<dyn LlmClient>,
        registry: Arc<CommandRegistry>,
        budget: Arc<BudgetManager>,
        operator: Arc<dyn Operator>,
        engine_interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            node,
            research,
            llm,
            registry,
            budget,
            operator,
            engine_interrupted,
            status_printer: StatusPrinter,
        }
    }

    fn is_interrupted(&self) -> bool {
        self.node.status() == ProblemStatus::Cancelled || self.engine_interrupted.load(Ordering::SeqCst)
    }

    /// Run cycles until the node pauses, terminates, or a stop is
    /// requested.
    pub async fn run(&self) -> TaskRunResult {
        while !self.is_interrupted() {
            match self.execute_cycle().await {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::Done(result)) => return result,
                Err(CycleError::Cancelled) => break,
                Err(CycleError::Shutdown) => {
                    info!(node = %self.node.title(), "shutdown requested by LLM");
                    return TaskRunResult::EngineStopRequested;
                }
                Err(CycleError::Aborted) => {
                    info!(node = %self.node.title(), "operator aborted LLM retry");
                    return TaskRunResult::EngineStopRequested;
                }
                Err(CycleError::Fatal(e)) => {
                    warn!(node = %self.node.title(), error = %e, "task execution failed");
                    self.node.set_status(ProblemStatus::Failed);
                    return TaskRunResult::TaskFailed;
                }
            }
        }
        self.handle_interruption();
        TaskRunResult::CompletedOrPaused
    }

    fn handle_interruption(&self) {
        if !self.node.status().is_terminal() {
            self.node.set_status(ProblemStatus::Cancelled);
        }
    }

    async fn execute_cycle(&self) -> Result<CycleOutcome, CycleError> {
        // 1. Budget gate
        if self.budget.increment_cycles_and_manage_budget(&self.node).await {
            if !self.node.status().is_terminal() {
                self.node.set_status(ProblemStatus::Failed);
            }
            return Ok(CycleOutcome::Done(TaskRunResult::EngineStopRequested));
        }

        // 2. Iteration counter (drives artifact auto-close)
        self.node.increment_iteration();
        let turn = self.node.current_iteration();

        // 3. Render interface and diff dynamic sections, then
        // 4. seal the aggregator into a tentative auto-reply
        let request = self.prepare_request().await.map_err(CycleError::Fatal)?;
        if let Ok(value) = serde_json::to_value(&request) {
            self.node.logger().log_llm_request(turn, &value);
        }

        // 5-8. Call the LLM with operator-driven retry; commit on success
        let response = self.call_llm_with_retry(&request).await?;
        self.node.logger().log_llm_response(turn, &response);

        // 9. Dispatch commands parsed from the response
        let dispatch = CommandProcessor::new(&self.registry).process(&response, &self.node, &self.research);
        if dispatch == Err(EngineSignal::ShutdownRequested) {
            return Err(CycleError::Shutdown);
        }

        self.status_printer.print_status(&self.research);

        // 10. Outcome
        let status = self.node.status();
        if matches!(status, ProblemStatus::Finished | ProblemStatus::Failed | ProblemStatus::Pending) {
            debug!(node = %self.node.title(), %status, "task completed or paused");
            return Ok(CycleOutcome::Done(TaskRunResult::CompletedOrPaused));
        }
        Ok(CycleOutcome::Continue)
    }

    /// Gather interface state, update history, and build the LLM request
    /// from the full block list (with the tentative auto-reply sealed in).
    async fn prepare_request(&self) -> Result<CompletionRequest> {
        let budget = self.budget.budget().await;
        let remaining = self.budget.remaining().await;
        let static_content = render_static_interface(&self.research, &self.registry, budget, remaining);
        let dynamic_data = collect_dynamic_data(&self.research, &self.node);

        let mut history = self.node.history();
        if !history.has_initial_interface() {
            history.set_initial_interface(static_content, dynamic_data.clone())?;
        } else {
            history.update_static_content(static_content);
        }
        history.aggregator_mut().update_dynamic_sections(dynamic_data);
        history.prepare_and_add_auto_reply_block();

        let messages = history_messages(history.blocks());
        Ok(self.llm.build_request(&messages))
    }

    /// Stream one response. On failure the tentative auto-reply is popped
    /// and the operator chooses between retry (which re-seals the block)
    /// and abort.
    async fn call_llm_with_retry(&self, request: &CompletionRequest) -> Result<String, CycleError> {
        loop {
            match self.attempt_stream(request).await {
                Ok(response) => {
                    self.node
                        .history()
                        .commit_llm_turn(response.as_str())
                        .map_err(|e| CycleError::Fatal(e.into()))?;
                    return Ok(response);
                }
                Err(AttemptError::Cancelled) => {
                    self.node.history().rollback_last_auto_reply();
                    return Err(CycleError::Cancelled);
                }
                Err(AttemptError::Llm(e)) => {
                    self.node.history().rollback_last_auto_reply();
                    warn!(node = %self.node.title(), error = %e, "LLM request failed");
                    let retry = retry_blocking(self.operator.clone(), e.to_string()).await;
                    if !retry {
                        return Err(CycleError::Aborted);
                    }
                    self.node.history().prepare_and_add_auto_reply_block();
                }
            }
        }
    }

    /// One streaming attempt, checking for cancellation between chunks.
    async fn attempt_stream(&self, request: &CompletionRequest) -> Result<String, AttemptError> {
        let (tx, mut rx) = mpsc::channel::<StreamChunk>(32);
        let llm = self.llm.clone();
        let request = request.clone();
        let call = tokio::spawn(async move { llm.stream(request, tx).await });

        let mut response = String::new();
        while let Some(chunk) = rx.recv().await {
            if self.is_interrupted() {
                drop(rx);
                call.abort();
                return Err(AttemptError::Cancelled);
            }
            if let StreamChunk::TextDelta(piece) = chunk {
                response.push_str(&piece);
            }
        }

        match call.await {
            Ok(Ok(())) => Ok(response),
            Ok(Err(e)) => Err(AttemptError::Llm(e)),
            Err(join_error) => Err(AttemptError::Llm(LlmError::InvalidResponse(join_error.to_string()))),
        }
    }
}

enum AttemptError {
    Cancelled,
    Llm(LlmError),
}
