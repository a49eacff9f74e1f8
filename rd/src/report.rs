//! Console status snapshot and the final report
//!
//! The status printer draws the research tree with one emoji per status
//! after every cycle. The final report collects the root's resolution
//! message and an index of every non-external artifact grouped by owning
//! node.

use std::collections::BTreeMap;
use std::sync::Arc;

use colored::Colorize;
use handlebars::Handlebars;
use tracing::warn;

use crate::research::Research;
use crate::research::node::ResearchNode;
use crate::research::state::ProblemStatus;

const FINAL_REPORT_TEMPLATE: &str = "\
# Final Report

{{#if resolution_message}}## Resolution

{{resolution_message}}

{{/if}}{{#if groups}}## Artifacts

{{#each groups}}### {{this.title}}
{{#each this.artifacts}}- {{this.name}} ({{this.path}})
{{/each}}
{{/each}}{{else}}No artifacts were produced.
{{/if}}";

fn status_emoji(status: ProblemStatus) -> &'static str {
    match status {
        ProblemStatus::Created => "🆕",
        ProblemStatus::ReadyToStart => "👀",
        ProblemStatus::Pending => "⏳",
        ProblemStatus::InProgress => "🔍",
        ProblemStatus::Finished => "✅",
        ProblemStatus::Failed => "❌",
        ProblemStatus::Cancelled => "🚫",
    }
}

/// Prints the tree snapshot to stdout
pub struct StatusPrinter;

impl StatusPrinter {
    pub fn print_status(&self, research: &Research) {
        let Some(root) = research.root_node() else {
            return;
        };
        let mut lines = vec![format!("{}", format!("=== {} ===", research.name()).bold())];
        collect_status_lines(&root, 0, &mut lines);
        println!("\n{}\n", lines.join("\n"));
    }
}

fn collect_status_lines(node: &Arc<ResearchNode>, indent: usize, out: &mut Vec<String>) {
    let status = node.status();
    let progress = format!("{}/{}", node.criteria_met_count(), node.criteria_total_count());
    out.push(format!(
        "{}{} {} [{}] criteria {} artifacts {}",
        "  ".repeat(indent),
        status_emoji(status),
        node.title().bold(),
        status.as_str().dimmed(),
        progress,
        node.artifacts().len(),
    ));
    for child in node.children() {
        collect_status_lines(&child, indent + 1, out);
    }
}

#[derive(serde::Serialize)]
struct ArtifactLine {
    name: String,
    path: String,
}

#[derive(serde::Serialize)]
struct ArtifactGroup {
    title: String,
    artifacts: Vec<ArtifactLine>,
}

/// Assemble the final report for a research run.
pub fn generate_final_report(research: &Research) -> String {
    let resolution_message = research.root_node().and_then(|root| root.resolution_message());

    let mut grouped: BTreeMap<String, Vec<ArtifactLine>> = BTreeMap::new();
    for (node, artifact) in research.collect_artifacts() {
        if artifact.is_external {
            continue;
        }
        let path = research
            .store()
            .artifact_relative_path(node.path(), &artifact.name)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| artifact.name.clone());
        grouped.entry(node.title().to_string()).or_default().push(ArtifactLine {
            name: artifact.name,
            path,
        });
    }

    let groups: Vec<ArtifactGroup> = grouped
        .into_iter()
        .map(|(title, artifacts)| ArtifactGroup { title, artifacts })
        .collect();

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .render_template(
            FINAL_REPORT_TEMPLATE,
            &serde_json::json!({
                "resolution_message": resolution_message,
                "groups": if groups.is_empty() { None } else { Some(groups) },
            }),
        )
        .unwrap_or_else(|e| {
            warn!(error = %e, "final report template failed to render");
            "# Final Report".to_string()
        })
}
