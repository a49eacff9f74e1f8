//! Dynamic interface sections
//!
//! Each section is a snapshot of some slice of engine state, captured as
//! plain data so that cycle-over-cycle changes can be detected by structural
//! equality. Rendering happens on demand when history is replayed for the
//! LLM; a section that changes again later in the conversation may render as
//! a short redaction note so the model only ever sees the newest version.

use serde::{Deserialize, Serialize};

use super::criteria::Criterion;

/// Snapshot of one artifact for interface rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactView {
    pub name: String,
    pub content: String,
    pub short_summary: String,
    pub is_external: bool,
    pub is_open: bool,
    pub owner_title: String,
}

/// Snapshot of one knowledge entry for interface rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntryView {
    pub title: String,
    pub content: String,
    pub author_node_title: String,
    pub timestamp: String,
    pub tags: Vec<String>,
}

/// Tagged sum of every dynamic section variant. Diffing between cycles is
/// structural equality on the variant data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DynamicSectionData {
    ProblemDefinition {
        title: String,
        content: String,
    },
    ProblemHierarchy {
        rendered_tree: String,
        target_title: String,
    },
    Criteria {
        items: Vec<Criterion>,
    },
    Artifacts {
        external: Vec<ArtifactView>,
        owned: Vec<ArtifactView>,
    },
    KnowledgeBase {
        entries: Vec<KnowledgeEntryView>,
    },
    PermanentLogs {
        entries: Vec<String>,
    },
}

impl DynamicSectionData {
    /// Render the section for the LLM. `future_changes` is the number of
    /// times this section changes again later in history; bulky sections
    /// redact themselves when a newer version follows.
    pub fn render(&self, future_changes: usize) -> String {
        match self {
            DynamicSectionData::ProblemDefinition { title, content } => {
                format!("<problem_definition title=\"{}\">\n{}\n</problem_definition>", title, content)
            }
            DynamicSectionData::ProblemHierarchy {
                rendered_tree,
                target_title,
            } => {
                format!(
                    "<problem_hierarchy current=\"{}\">\n{}\n</problem_hierarchy>",
                    target_title, rendered_tree
                )
            }
            DynamicSectionData::Criteria { items } => render_criteria(items),
            DynamicSectionData::Artifacts { external, owned } => {
                if future_changes > 0 {
                    return "<artifacts>\nNew artifacts have been added in the future, redacted the old from history to keep it clean.\n</artifacts>".to_string();
                }
                render_artifacts(external, owned)
            }
            DynamicSectionData::KnowledgeBase { entries } => {
                if future_changes > 0 {
                    return "<knowledge_base>\n[Knowledge base content omitted as it was updated later in the conversation.]\n</knowledge_base>".to_string();
                }
                render_knowledge(entries)
            }
            DynamicSectionData::PermanentLogs { entries } => {
                if entries.is_empty() {
                    "<permanent_logs>\n(no entries yet)\n</permanent_logs>".to_string()
                } else {
                    format!("<permanent_logs>\n{}\n</permanent_logs>", entries.join("\n"))
                }
            }
        }
    }
}

fn render_criteria(items: &[Criterion]) -> String {
    if items.is_empty() {
        return "<criteria_of_definition_of_done>\n(none defined yet)\n</criteria_of_definition_of_done>".to_string();
    }
    let mut out = String::from("<criteria_of_definition_of_done>\n");
    for (i, criterion) in items.iter().enumerate() {
        let marker = if criterion.is_completed { "[x]" } else { "[ ]" };
        out.push_str(&format!("{}. {} {}\n", i + 1, marker, criterion.content));
    }
    out.push_str("</criteria_of_definition_of_done>");
    out
}

fn render_artifacts(external: &[ArtifactView], owned: &[ArtifactView]) -> String {
    let mut out = String::from("<artifacts>\n");

    if !external.is_empty() {
        out.push_str("## External files (read-only)\n");
        for artifact in external {
            out.push_str(&format!("### {}\n{}\n\n", artifact.name, artifact.content));
        }
    }

    if owned.is_empty() && external.is_empty() {
        out.push_str("(no artifacts yet)\n");
    }

    for artifact in owned {
        if artifact.is_open {
            out.push_str(&format!(
                "### {} (owner: {}, open)\nSummary: {}\n\n{}\n\n",
                artifact.name, artifact.owner_title, artifact.short_summary, artifact.content
            ));
        } else {
            out.push_str(&format!(
                "### {} (owner: {}, closed - use open_artifact to view)\nSummary: {}\n\n",
                artifact.name, artifact.owner_title, artifact.short_summary
            ));
        }
    }

    out.push_str("</artifacts>");
    out
}

fn render_knowledge(entries: &[KnowledgeEntryView]) -> String {
    if entries.is_empty() {
        return "<knowledge_base>\n(empty)\n</knowledge_base>".to_string();
    }
    let mut out = String::from("<knowledge_base>\n");
    for entry in entries {
        out.push_str(&format!("## {} (by {}, {})\n", entry.title, entry.author_node_title, entry.timestamp));
        if !entry.tags.is_empty() {
            out.push_str(&format!("Tags: {}\n", entry.tags.join(", ")));
        }
        out.push_str(&format!("{}\n\n", entry.content));
    }
    out.push_str("</knowledge_base>");
    out
}
