//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// researchdaemon - hierarchical LLM research engine
#[derive(Parser)]
#[command(
    name = "rd",
    about = "LLM-driven hierarchical research engine",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a research instruction to completion
    Run {
        /// The research instruction
        instruction: String,

        /// Repository root directory
        #[arg(long, default_value = ".")]
        root_dir: PathBuf,

        /// Research instance name
        #[arg(long, default_value = "default")]
        research: String,

        /// Cycle budget (omit for unlimited)
        #[arg(short, long)]
        budget: Option<i64>,

        /// Attach a file (or directory) as external input; repeatable
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },

    /// List research instances in a repository
    List {
        /// Repository root directory
        #[arg(long, default_value = ".")]
        root_dir: PathBuf,
    },

    /// Search artifact names across all research instances
    Search {
        /// Substring to search for
        query: String,

        /// Repository root directory
        #[arg(long, default_value = ".")]
        root_dir: PathBuf,
    },

    /// Print the final report of a research instance
    Report {
        /// Repository root directory
        #[arg(long, default_value = ".")]
        root_dir: PathBuf,

        /// Research instance name
        #[arg(long, default_value = "default")]
        research: String,
    },
}
