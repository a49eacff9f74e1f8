//! Research engine: the scheduling loop over one research instance
//!
//! The engine thread is the only caller of `TaskTree::next()`. Every node
//! handed out is moved to `IN_PROGRESS` and given to a freshly spawned
//! worker; coordination between workers happens purely through node status
//! events. The loop exits when the tree is terminal, a worker requests a
//! stop, or the operator interrupts, and then emits the final report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Result, bail};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::budget::BudgetManager;
use crate::commands::CommandRegistry;
use crate::llm::LlmClient;
use crate::operator::Operator;
use crate::processor::{TaskProcessor, TaskRunResult};
use crate::report::{StatusPrinter, generate_final_report};
use crate::research::Research;
use crate::research::repo::Repo;
use crate::research::state::ProblemStatus;

pub struct ResearchEngine {
    repo: Arc<Repo>,
    research: Arc<Research>,
    llm: Arc<dyn LlmClient>,
    registry: Arc<CommandRegistry>,
    budget: Arc<BudgetManager>,
    operator: Arc<dyn Operator>,
    engine_should_stop: Arc<AtomicBool>,
    engine_interrupted: Arc<AtomicBool>,
    stop_notify: Arc<tokio::sync::Notify>,
    status_printer: StatusPrinter,
}

impl ResearchEngine {
    pub fn new(
        repo: Arc<Repo>,
        research_name: &str,
        llm: Arc<dyn LlmClient>,
        operator: Arc<dyn Operator>,
    ) -> Result<Self> {
        let research = repo.create_research(research_name)?;
        Ok(Self {
            repo,
            research,
            llm,
            registry: Arc::new(CommandRegistry::standard()),
            budget: Arc::new(BudgetManager::new(operator.clone())),
            operator,
            engine_should_stop: Arc::new(AtomicBool::new(false)),
            engine_interrupted: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(tokio::sync::Notify::new()),
            status_printer: StatusPrinter,
        })
    }

    pub fn repo(&self) -> &Arc<Repo> {
        &self.repo
    }

    pub fn research(&self) -> &Arc<Research> {
        &self.research
    }

    pub fn budget(&self) -> &Arc<BudgetManager> {
        &self.budget
    }

    pub fn has_root_problem_defined(&self) -> bool {
        self.research.has_root_problem_defined()
    }

    /// Create the root node from the user instruction and mark it ready.
    pub fn define_root_problem(&self, instruction: &str) -> Result<()> {
        let root = self.research.define_root_problem(instruction)?;
        root.set_status(ProblemStatus::ReadyToStart);
        self.status_printer.print_status(&self.research);
        Ok(())
    }

    /// Inject a follow-up instruction into the root node and wake it up.
    pub fn add_new_instruction(&self, instruction: &str) -> Result<()> {
        let Some(root) = self.research.root_node() else {
            bail!("cannot add an instruction before the root problem is defined");
        };
        root.history()
            .aggregator_mut()
            .add_internal_message_from(instruction, "USER MESSAGE");
        root.set_status(ProblemStatus::ReadyToStart);
        info!(node = %root.title(), "new instruction queued");
        Ok(())
    }

    /// Drive the research to completion and return the final report.
    pub async fn execute(&self) -> Result<String> {
        if !self.has_root_problem_defined() {
            bail!("root problem must be defined before execution");
        }
        self.engine_should_stop.store(false, Ordering::SeqCst);
        self.engine_interrupted.store(false, Ordering::SeqCst);

        let tree = self.research.task_tree().clone();
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        loop {
            if self.engine_should_stop.load(Ordering::SeqCst) || self.engine_interrupted.load(Ordering::SeqCst) {
                break;
            }

            let next = tokio::select! {
                next = tree.next() => next,
                _ = self.stop_notify.notified() => break,
                _ = tokio::signal::ctrl_c() => {
                    warn!("operator interrupt, draining workers");
                    self.engine_interrupted.store(true, Ordering::SeqCst);
                    break;
                }
            };
            let Some(node) = next else {
                break;
            };
            if self.engine_should_stop.load(Ordering::SeqCst) {
                break;
            }

            node.set_status(ProblemStatus::InProgress);
            self.status_printer.print_status(&self.research);

            let processor = TaskProcessor::new(
                node,
                self.research.clone(),
                self.llm.clone(),
                self.registry.clone(),
                self.budget.clone(),
                self.operator.clone(),
                self.engine_interrupted.clone(),
            );
            let should_stop = self.engine_should_stop.clone();
            let stop_notify = self.stop_notify.clone();
            workers.push(tokio::spawn(async move {
                let result = processor.run().await;
                if result == TaskRunResult::EngineStopRequested {
                    should_stop.store(true, Ordering::SeqCst);
                    // wake the engine even when no status event fired
                    stop_notify.notify_one();
                }
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }

        Ok(generate_final_report(&self.research))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::operator::ScriptedOperator;
    use tempfile::tempdir;

    fn engine_with(temp: &tempfile::TempDir, responses: Vec<&str>) -> ResearchEngine {
        let repo = Arc::new(Repo::open(temp.path()).unwrap());
        let llm = Arc::new(MockLlmClient::with_responses(responses));
        let operator = Arc::new(ScriptedOperator::declining());
        ResearchEngine::new(repo, "default", llm, operator).unwrap()
    }

    #[tokio::test]
    async fn test_execute_requires_root_problem() {
        let temp = tempdir().unwrap();
        let engine = engine_with(&temp, vec![]);
        assert!(engine.execute().await.is_err());
    }

    #[tokio::test]
    async fn test_single_node_run_produces_report() {
        let temp = tempdir().unwrap();
        let engine = engine_with(
            &temp,
            vec![
                "<<< add_artifact\n///name\nA\n///content\ncontent\n///short_summary\ns\n>>>\n<<< finish_problem\n///message\nsummarized\n>>>",
            ],
        );
        engine.define_root_problem("Summarize X").unwrap();

        let report = engine.execute().await.unwrap();

        let root = engine.research().root_node().unwrap();
        assert_eq!(root.status(), ProblemStatus::Finished);
        assert!(report.contains("summarized"));
        assert!(report.contains("A (Results/default/A.md)"));
    }

    #[tokio::test]
    async fn test_subproblem_dispatch_across_workers() {
        let temp = tempdir().unwrap();
        // Root spawns and waits on S; the child finishes; the root then
        // finishes on its second turn.
        let engine = engine_with(
            &temp,
            vec![
                "<<< add_subproblem\n///title\nS\n///content\nsub work\n>>>\n<<< activate_subproblems\n///title\nS\n>>>\n<<< wait_for_subproblems\n///title\nS\n>>>",
                "<<< finish_problem\n///message\nchild done\n>>>",
                "<<< finish_problem\n///message\nall done\n>>>",
            ],
        );
        engine.define_root_problem("Decompose the work").unwrap();

        let report = tokio::time::timeout(std::time::Duration::from_secs(10), engine.execute())
            .await
            .expect("engine should converge")
            .unwrap();

        let root = engine.research().root_node().unwrap();
        assert_eq!(root.status(), ProblemStatus::Finished);
        let child = root.child_by_title("S").unwrap();
        assert_eq!(child.status(), ProblemStatus::Finished);
        assert!(report.contains("all done"));

        // The root saw the child's completion message on its second turn
        let history = root.history();
        let all_blocks = format!("{:?}", history.blocks());
        assert!(all_blocks.contains("child done"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_declined_stops_engine() {
        let temp = tempdir().unwrap();
        let repo = Arc::new(Repo::open(temp.path()).unwrap());
        let llm = Arc::new(MockLlmClient::with_responses(vec![
            "<<< think\nfirst\n>>>",
            "<<< think\nsecond\n>>>",
            "<<< think\nthird\n>>>",
        ]));
        let operator = Arc::new(ScriptedOperator::declining());
        let engine = ResearchEngine::new(repo, "default", llm, operator).unwrap();
        engine.budget().set_budget(Some(2)).await;
        engine.define_root_problem("Grind forever").unwrap();

        let report = tokio::time::timeout(std::time::Duration::from_secs(10), engine.execute())
            .await
            .expect("engine should stop on exhausted budget")
            .unwrap();

        let root = engine.research().root_node().unwrap();
        assert_eq!(root.status(), ProblemStatus::Failed);
        assert!(report.contains("# Final Report"));
    }

    #[tokio::test]
    async fn test_new_instruction_requeues_root() {
        let temp = tempdir().unwrap();
        let engine = engine_with(&temp, vec!["<<< finish_problem\n>>>", "<<< finish_problem\n>>>"]);
        engine.define_root_problem("First pass").unwrap();
        engine.execute().await.unwrap();

        engine.add_new_instruction("Now go deeper").unwrap();
        let root = engine.research().root_node().unwrap();
        assert_eq!(root.status(), ProblemStatus::ReadyToStart);

        engine.execute().await.unwrap();
        assert_eq!(root.status(), ProblemStatus::Finished);
        let history = root.history();
        let rendered = format!("{:?}", history.blocks());
        assert!(rendered.contains("Now go deeper"));
    }
}
