//! researchdaemon - LLM-driven hierarchical research engine
//!
//! A user instruction becomes a tree of sub-problems. The scheduler hands
//! ready nodes to parallel workers; each worker drives an LLM through a
//! strict turn protocol where replies are parsed into commands that mutate
//! the tree, the shared knowledge base, and a durable per-node history.
//! When the root turns terminal the engine assembles a final report.
//!
//! # Modules
//!
//! - [`research`] - node tree, history, artifacts, knowledge base, repo
//! - [`tree`] - event-driven depth-first scheduler
//! - [`processor`] - per-node LLM turn loop with transactional auto-replies
//! - [`commands`] - block grammar parser, registry, and built-in commands
//! - [`llm`] - provider adapter (Anthropic) and scripted mock
//! - [`engine`] - the worker-spawning engine loop
//! - [`budget`] - cycle budget with interactive extension

pub mod budget;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod llm;
pub mod operator;
pub mod processor;
pub mod report;
pub mod research;
pub mod store;
pub mod tree;

// Re-export commonly used types
pub use budget::BudgetManager;
pub use commands::{Command, CommandArgs, CommandContext, CommandProcessor, CommandRegistry, EngineSignal};
pub use config::{Config, LlmConfig};
pub use engine::ResearchEngine;
pub use llm::{AnthropicClient, CompletionRequest, HistoryMessage, LlmClient, LlmError, StreamChunk, create_client};
pub use operator::{ConsoleOperator, Operator, ScriptedOperator};
pub use processor::{TaskProcessor, TaskRunResult};
pub use report::{StatusPrinter, generate_final_report};
pub use research::Research;
pub use research::artifact::Artifact;
pub use research::knowledge::{KnowledgeBase, KnowledgeEntry};
pub use research::node::ResearchNode;
pub use research::repo::Repo;
pub use research::state::{ARTIFACT_AUTO_CLOSE_ITERATIONS, NodeState, ProblemStatus};
pub use store::{DualStore, MarkdownFile, StoreError, sanitize_filename};
pub use tree::TaskTree;
