//! rd - CLI entry point for the research engine

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use researchdaemon::cli::{Cli, Command};
use researchdaemon::config::Config;
use researchdaemon::engine::ResearchEngine;
use researchdaemon::llm::create_client;
use researchdaemon::operator::ConsoleOperator;
use researchdaemon::report::generate_final_report;
use researchdaemon::research::repo::Repo;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("researchdaemon")
        .join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("researchdaemon.log")).context("Failed to create log file")?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    match cli.command {
        Command::Run {
            instruction,
            root_dir,
            research,
            budget,
            files,
        } => cmd_run(&config, &instruction, &root_dir, &research, budget, &files).await,
        Command::List { root_dir } => cmd_list(&root_dir),
        Command::Search { query, root_dir } => cmd_search(&root_dir, &query),
        Command::Report { root_dir, research } => cmd_report(&root_dir, &research),
    }
}

async fn cmd_run(
    config: &Config,
    instruction: &str,
    root_dir: &Path,
    research_name: &str,
    budget: Option<i64>,
    files: &[PathBuf],
) -> Result<()> {
    let repo = Arc::new(Repo::open(root_dir)?);
    let llm = create_client(&config.llm)?;
    let engine = ResearchEngine::new(repo, research_name, llm, Arc::new(ConsoleOperator))?;

    ingest_external_files(&engine, files)?;

    engine.budget().set_budget(budget).await;
    if engine.has_root_problem_defined() {
        engine.add_new_instruction(instruction)?;
    } else {
        engine.define_root_problem(instruction)?;
    }

    info!(research = research_name, "starting research run");
    let report = engine.execute().await?;
    println!("{}", report);
    Ok(())
}

fn ingest_external_files(engine: &ResearchEngine, files: &[PathBuf]) -> Result<()> {
    for path in files {
        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    ingest_one_file(engine, entry.path())?;
                }
            }
        } else {
            ingest_one_file(engine, path)?;
        }
    }
    Ok(())
}

fn ingest_one_file(engine: &ResearchEngine, path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "external_file".to_string());
    let content = fs::read_to_string(path).context(format!("Failed to read external file {}", path.display()))?;
    engine.research().external_files().add_external_file(&name, &content)?;
    info!(file = %name, "external file attached");
    Ok(())
}

fn cmd_list(root_dir: &Path) -> Result<()> {
    let repo = Repo::open(root_dir)?;
    let instances = repo.list_research_instances();
    if instances.is_empty() {
        println!("No research instances found under {}", root_dir.display());
    } else {
        for name in instances {
            let status = repo
                .get_research(&name)
                .and_then(|r| r.root_node())
                .map(|root| root.status().to_string())
                .unwrap_or_else(|| "NOT STARTED".to_string());
            println!("{}  [{}]", name, status);
        }
    }
    Ok(())
}

fn cmd_search(root_dir: &Path, query: &str) -> Result<()> {
    let repo = Repo::open(root_dir)?;
    let hits = repo.search_artifacts_across_all(query);
    if hits.is_empty() {
        println!("No artifacts matching '{}'", query);
        return Ok(());
    }
    for (research, node, artifact) in hits {
        println!("{} / {} / {}", research, node.title(), artifact.name);
    }
    Ok(())
}

fn cmd_report(root_dir: &Path, research_name: &str) -> Result<()> {
    let repo = Repo::open(root_dir)?;
    let Some(research) = repo.get_research(research_name) else {
        eyre::bail!("research '{}' not found under {}", research_name, root_dir.display());
    };
    println!("{}", generate_final_report(&research));
    Ok(())
}
