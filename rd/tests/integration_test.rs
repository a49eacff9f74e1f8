//! Integration tests for the research engine
//!
//! End-to-end scenarios driving the engine with a scripted LLM: artifact
//! production, subproblem dispatch across workers, error-gated finishes,
//! budget exhaustion, rollback on transport failure, and persistence
//! round-trips.

use std::sync::Arc;
use std::time::Duration;

use researchdaemon::engine::ResearchEngine;
use researchdaemon::llm::mock::{MockLlmClient, ScriptedTurn};
use researchdaemon::operator::ScriptedOperator;
use researchdaemon::research::repo::Repo;
use researchdaemon::research::state::ProblemStatus;
use researchdaemon::store::sanitize_filename;
use tempfile::TempDir;

fn engine_with_script(temp: &TempDir, turns: Vec<ScriptedTurn>, operator: ScriptedOperator) -> ResearchEngine {
    let repo = Arc::new(Repo::open(temp.path()).expect("repo opens"));
    let llm = Arc::new(MockLlmClient::new(turns));
    ResearchEngine::new(repo, "default", llm, Arc::new(operator)).expect("engine builds")
}

fn respond(text: &str) -> ScriptedTurn {
    ScriptedTurn::Respond(text.to_string())
}

async fn run_engine(engine: &ResearchEngine) -> String {
    tokio::time::timeout(Duration::from_secs(20), engine.execute())
        .await
        .expect("engine converges")
        .expect("engine succeeds")
}

// =============================================================================
// Scenario: single-node finish
// =============================================================================

#[tokio::test]
async fn test_single_node_finish_produces_artifact_and_report() {
    let temp = TempDir::new().unwrap();
    let engine = engine_with_script(
        &temp,
        vec![respond(
            "<<< add_artifact\n///name\nA\n///content\ncollected facts about X\n///short_summary\nthe summary\n>>>\n\
             <<< finish_problem\n>>>",
        )],
        ScriptedOperator::declining(),
    );
    engine.define_root_problem("Summarize X").unwrap();

    let report = run_engine(&engine).await;

    let root = engine.research().root_node().unwrap();
    assert_eq!(root.status(), ProblemStatus::Finished);

    // artifact file exists under Results/default/
    let artifact_path = temp.path().join("Results").join("default").join(sanitize_filename("A"));
    assert!(artifact_path.exists(), "artifact persisted at {}", artifact_path.display());

    // final report lists A under the root's title
    assert!(report.contains("### default"));
    assert!(report.contains("A (Results/default/A.md)"));
}

// =============================================================================
// Scenario: subproblem dispatch
// =============================================================================

#[tokio::test]
async fn test_subproblem_dispatch_and_parent_wakeup() {
    let temp = TempDir::new().unwrap();
    let engine = engine_with_script(
        &temp,
        vec![
            respond(
                "<<< add_subproblem\n///title\nS\n///content\ninvestigate the sub-part\n>>>\n\
                 <<< activate_subproblems\n///title\nS\n>>>\n\
                 <<< wait_for_subproblems\n///title\nS\n>>>",
            ),
            respond("<<< add_artifact\n///name\nSub Findings\n///content\ndetails\n///short_summary\ns\n>>>\n<<< finish_problem\n///message\nsub complete\n>>>"),
            respond("<<< finish_problem\n///message\neverything synthesized\n>>>"),
        ],
        ScriptedOperator::declining(),
    );
    engine.define_root_problem("Decompose and conquer").unwrap();

    let report = run_engine(&engine).await;

    let root = engine.research().root_node().unwrap();
    let child = root.child_by_title("S").unwrap();

    assert_eq!(root.status(), ProblemStatus::Finished);
    assert_eq!(child.status(), ProblemStatus::Finished);
    assert!(root.node_state().pending_child_node_ids.is_empty());
    assert_eq!(root.resolution_message().as_deref(), Some("everything synthesized"));
    assert!(report.contains("Sub Findings"));
    assert!(report.contains("Results/default/Subproblems/S/Sub_Findings.md"));
}

// =============================================================================
// Scenario: finish gated by errors
// =============================================================================

#[tokio::test]
async fn test_finish_gated_by_errors_requires_confirmation() {
    let temp = TempDir::new().unwrap();
    let engine = engine_with_script(
        &temp,
        vec![
            respond("<<< unknown_cmd\n///x\ny\n>>>\n<<< finish_problem\n>>>"),
            // second turn resends cleanly
            respond("<<< finish_problem\n>>>"),
        ],
        ScriptedOperator::declining(),
    );
    engine.define_root_problem("Fragile plan").unwrap();

    run_engine(&engine).await;

    let root = engine.research().root_node().unwrap();
    assert_eq!(root.status(), ProblemStatus::Finished, "second clean finish succeeds");

    // the first turn produced a confirmation request in the history
    let history = root.history();
    let serialized = serde_json::to_string(history.blocks()).unwrap();
    assert!(serialized.contains("do you really want to go ahead"));
    assert!(serialized.contains("Unknown command"));
}

// =============================================================================
// Scenario: budget exhaustion
// =============================================================================

#[tokio::test]
async fn test_budget_exhaustion_declined_fails_node() {
    let temp = TempDir::new().unwrap();
    let engine = engine_with_script(
        &temp,
        vec![
            respond("<<< add_artifact\n///name\nPartial\n///content\nhalf done\n///short_summary\ns\n>>>"),
            respond("<<< think\nstill going\n>>>"),
            respond("<<< think\nnever reached?\n>>>"),
        ],
        ScriptedOperator::declining(),
    );
    engine.budget().set_budget(Some(2)).await;
    engine.define_root_problem("Endless digging").unwrap();

    let report = run_engine(&engine).await;

    let root = engine.research().root_node().unwrap();
    assert_eq!(root.status(), ProblemStatus::Failed);
    // artifacts created before exhaustion still show up
    assert!(report.contains("Partial"));
}

// =============================================================================
// Scenario: rollback on LLM failure
// =============================================================================

#[tokio::test]
async fn test_rollback_on_llm_failure_with_abort() {
    let temp = TempDir::new().unwrap();
    let engine = engine_with_script(
        &temp,
        vec![ScriptedTurn::Fail("connection reset".to_string())],
        // no retry: operator aborts at the prompt
        ScriptedOperator::new(vec![], vec![false]),
    );
    engine.define_root_problem("Doomed call").unwrap();

    run_engine(&engine).await;

    let root = engine.research().root_node().unwrap();
    // worker ended without failing or finishing the node
    assert_eq!(root.status(), ProblemStatus::InProgress);
    let history = root.history();
    // only the initial interface block remains; the auto-reply was rolled back
    assert_eq!(history.len(), 1);
}

// =============================================================================
// Scenario: knowledge-base uniqueness
// =============================================================================

#[tokio::test]
async fn test_knowledge_base_uniqueness_across_turns() {
    let temp = TempDir::new().unwrap();
    let engine = engine_with_script(
        &temp,
        vec![
            respond("<<< add_knowledge\n///title\nKey Insight\n///content\nfirst version\n>>>"),
            respond("<<< add_knowledge\n///title\nKey Insight\n///content\nsecond version\n>>>\n<<< finish_problem\n>>>"),
            respond("<<< finish_problem\n>>>"),
        ],
        ScriptedOperator::declining(),
    );
    engine.define_root_problem("Collect insights").unwrap();

    run_engine(&engine).await;

    let kb = engine.research().knowledge_base();
    assert_eq!(kb.len(), 1);
    assert_eq!(kb.get_entry("Key Insight").unwrap().content, "first version");

    // exactly one file on disk
    let kb_dir = temp.path().join("Knowledgebase");
    let files: Vec<_> = std::fs::read_dir(&kb_dir).unwrap().collect();
    assert_eq!(files.len(), 1);

    // second turn reported the duplicate, gating that finish
    let root = engine.research().root_node().unwrap();
    let history = root.history();
    let serialized = serde_json::to_string(history.blocks()).unwrap();
    assert!(serialized.contains("already exists"));
}

// =============================================================================
// Persistence round-trips
// =============================================================================

#[tokio::test]
async fn test_research_reload_after_run() {
    let temp = TempDir::new().unwrap();
    {
        let engine = engine_with_script(
            &temp,
            vec![
                respond(
                    "<<< add_criteria\n///criteria\nCover the basics\n>>>\n\
                     <<< mark_criteria_as_done\n///criteria_number\n1\n>>>\n\
                     <<< add_subproblem\n///title\nLater Work\n///content\ndeferred\n>>>\n\
                     <<< finish_problem\n///message\nwrapped\n>>>",
                ),
            ],
            ScriptedOperator::declining(),
        );
        engine.define_root_problem("Persist me").unwrap();
        run_engine(&engine).await;
    }

    // A fresh repo scan reloads the tree with state intact
    let repo = Repo::open(temp.path()).unwrap();
    let research = repo.get_research("default").unwrap();
    let root = research.root_node().unwrap();

    assert_eq!(root.status(), ProblemStatus::Finished);
    assert_eq!(root.resolution_message().as_deref(), Some("wrapped"));
    assert_eq!(root.criteria().len(), 1);
    assert!(root.criteria()[0].is_completed);
    assert_eq!(root.children().len(), 1);
    assert_eq!(root.children()[0].title(), "Later Work");
    assert_eq!(root.children()[0].status(), ProblemStatus::Created);
    assert!(!root.history().is_empty());
}

#[tokio::test]
async fn test_interrupted_node_loads_as_failed() {
    let temp = TempDir::new().unwrap();
    {
        let repo = Repo::open(temp.path()).unwrap();
        let research = repo.create_research("default").unwrap();
        let root = research.define_root_problem("crashy").unwrap();
        root.set_status(ProblemStatus::InProgress);
    }

    let repo = Repo::open(temp.path()).unwrap();
    let root = repo.get_research("default").unwrap().root_node().unwrap();
    assert_eq!(root.status(), ProblemStatus::Failed);
}

// =============================================================================
// Cross-node messaging
// =============================================================================

#[tokio::test]
async fn test_send_message_reaches_child_turn() {
    let temp = TempDir::new().unwrap();
    let engine = engine_with_script(
        &temp,
        vec![
            respond(
                "<<< add_subproblem\n///title\nWorkerNode\n///content\ndelegated\n>>>\n\
                 <<< send_message_to\n///subproblem_title\nWorkerNode\n///message\nfocus on the 2024 numbers\n>>>\n\
                 <<< activate_subproblems\n///title\nWorkerNode\n>>>\n\
                 <<< wait_for_subproblems\n///title\nWorkerNode\n>>>",
            ),
            respond("<<< finish_problem\n>>>"),
            respond("<<< finish_problem\n>>>"),
        ],
        ScriptedOperator::declining(),
    );
    engine.define_root_problem("Coordinate").unwrap();

    run_engine(&engine).await;

    let root = engine.research().root_node().unwrap();
    let child = root.child_by_title("WorkerNode").unwrap();
    // the message was compiled into the child's first auto-reply
    let history = child.history();
    let serialized = serde_json::to_string(history.blocks()).unwrap();
    assert!(serialized.contains("focus on the 2024 numbers"));
}
