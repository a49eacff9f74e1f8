//! Interface rendering: the static preamble and the dynamic data snapshot
//!
//! The static part (mission, command reference, budget counters) goes into
//! the `InitialInterface` block and is refreshed in place each cycle; the
//! dynamic part is a list of section snapshots diffed cycle over cycle.

use std::sync::Arc;

use handlebars::Handlebars;
use tracing::warn;

use crate::commands::CommandRegistry;

use super::Research;
use super::node::ResearchNode;
use super::sections::{ArtifactView, DynamicSectionData, KnowledgeEntryView};

const STATIC_INTERFACE_TEMPLATE: &str = "\
# Deep Research Assistant

You are working on the problem shown in the sections below, one node of a
larger research tree. Decompose work into subproblems where it helps, record
results as artifacts, and finish the problem when its criteria are met.

Research: {{research_name}}
{{budget_line}}

Commands are issued as blocks:

```
<<< command_name
///section_name
section content
>>>
```

Rules: blocks cannot nest, every section needs content, and a message may
contain several blocks. Results of your commands arrive in the next
automatic reply.

## Available commands

{{command_reference}}";

/// Render the static interface content.
pub fn render_static_interface(
    research: &Research,
    registry: &CommandRegistry,
    budget: Option<u32>,
    remaining: Option<i64>,
) -> String {
    let budget_line = match (budget, remaining) {
        (Some(budget), Some(remaining)) => {
            format!("Budget: {} message cycles total, {} remaining.", budget, remaining)
        }
        _ => "Budget: unlimited.".to_string(),
    };

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .render_template(
            STATIC_INTERFACE_TEMPLATE,
            &serde_json::json!({
                "research_name": research.name(),
                "budget_line": budget_line,
                "command_reference": command_reference(registry),
            }),
        )
        .unwrap_or_else(|e| {
            warn!(error = %e, "static interface template failed to render");
            format!("# Deep Research Assistant\n\nResearch: {}", research.name())
        })
}

/// One-paragraph reference entry per registered command.
fn command_reference(registry: &CommandRegistry) -> String {
    let mut out = String::new();
    for command in registry.iter() {
        out.push_str(&format!("### {}\n{}\n", command.name(), command.help()));
        for section in command.sections() {
            let mut flags = Vec::new();
            if !section.required {
                flags.push("optional");
            }
            if section.allow_multiple {
                flags.push("repeatable");
            }
            let flag_str = if flags.is_empty() { String::new() } else { format!(" ({})", flags.join(", ")) };
            out.push_str(&format!("- ///{}{}: {}\n", section.name, flag_str, section.help));
        }
        out.push('\n');
    }
    out
}

/// Snapshot every dynamic section for `node`, in the fixed interface order.
pub fn collect_dynamic_data(research: &Research, node: &Arc<ResearchNode>) -> Vec<DynamicSectionData> {
    vec![
        DynamicSectionData::ProblemDefinition {
            title: node.title().to_string(),
            content: node.problem_content(),
        },
        hierarchy_section(research, node),
        DynamicSectionData::Criteria {
            items: node.criteria(),
        },
        artifacts_section(research, node),
        knowledge_section(research),
        DynamicSectionData::PermanentLogs {
            entries: research.permanent_logs().entries(),
        },
    ]
}

fn hierarchy_section(research: &Research, node: &Arc<ResearchNode>) -> DynamicSectionData {
    let rendered_tree = match research.root_node() {
        Some(root) => {
            let mut lines = Vec::new();
            build_hierarchy_tree(&root, node, 0, &mut lines);
            lines.join("\n")
        }
        None => String::new(),
    };
    DynamicSectionData::ProblemHierarchy {
        rendered_tree,
        target_title: node.title().to_string(),
    }
}

/// XML-ish tree with per-node status, criteria progress, depth and artifact
/// counts; the current node is flagged.
fn build_hierarchy_tree(node: &Arc<ResearchNode>, current: &Arc<ResearchNode>, indent: usize, out: &mut Vec<String>) {
    let pad = "  ".repeat(indent);
    let mut tag = format!(
        "{}<\"{}\" status=\"{}\" criteriaProgress={}/{} depth={} artifacts={}",
        pad,
        node.title(),
        node.status(),
        node.criteria_met_count(),
        node.criteria_total_count(),
        node.depth_from_root(),
        node.artifacts().len(),
    );
    if Arc::ptr_eq(node, current) {
        tag.push_str(" isCurrent=\"true\"");
    }

    let children = node.children();
    if children.is_empty() {
        tag.push_str(" />");
        out.push(tag);
    } else {
        tag.push('>');
        out.push(tag);
        for child in &children {
            build_hierarchy_tree(child, current, indent + 1, out);
        }
        out.push(format!("{}</\"{}\">", pad, node.title()));
    }
}

fn artifacts_section(research: &Research, node: &Arc<ResearchNode>) -> DynamicSectionData {
    let external: Vec<ArtifactView> = research
        .external_files()
        .as_artifacts()
        .into_iter()
        .map(|artifact| ArtifactView {
            name: artifact.name.clone(),
            content: artifact.content.clone(),
            short_summary: artifact.short_summary.clone(),
            is_external: true,
            is_open: true,
            owner_title: research.name().to_string(),
        })
        .collect();

    let mut owned: Vec<(String, ArtifactView)> = research
        .collect_artifacts()
        .into_iter()
        .map(|(owner, artifact)| {
            let is_open = node.artifact_visibility(&artifact.name);
            (
                owner.title().to_string(),
                ArtifactView {
                    name: artifact.name,
                    content: artifact.content,
                    short_summary: artifact.short_summary,
                    is_external: false,
                    is_open,
                    owner_title: owner.title().to_string(),
                },
            )
        })
        .collect();
    owned.sort_by(|a, b| (&a.0, &a.1.name).cmp(&(&b.0, &b.1.name)));

    DynamicSectionData::Artifacts {
        external,
        owned: owned.into_iter().map(|(_, view)| view).collect(),
    }
}

fn knowledge_section(research: &Research) -> DynamicSectionData {
    let entries = research
        .knowledge_base()
        .entries()
        .into_iter()
        .map(|entry| KnowledgeEntryView {
            title: entry.title,
            content: entry.content,
            author_node_title: entry.author_node_title,
            timestamp: entry.timestamp.to_rfc3339(),
            tags: entry.tags,
        })
        .collect();
    DynamicSectionData::KnowledgeBase { entries }
}
