//! Definition-of-done criteria, persisted as a numbered checklist

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{StoreError, read_to_string, write_file};

pub const CRITERIA_FILE: &str = "Criteria of Definition of Done.md";

/// One criterion for declaring a problem done
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl Criterion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_completed: false,
        }
    }
}

/// Render criteria as `N. [x] text` lines.
pub fn save_criteria(node_path: &Path, criteria: &[Criterion]) -> Result<(), StoreError> {
    let mut out = String::new();
    for (i, criterion) in criteria.iter().enumerate() {
        let marker = if criterion.is_completed { "[x]" } else { "[ ]" };
        out.push_str(&format!("{}. {} {}\n", i + 1, marker, criterion.content));
    }
    write_file(&node_path.join(CRITERIA_FILE), &out)
}

/// Parse the checklist back. Lines that do not look like entries are
/// skipped with a warning.
pub fn load_criteria(node_path: &Path) -> Result<Vec<Criterion>, StoreError> {
    let path = node_path.join(CRITERIA_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut criteria = Vec::new();
    for line in read_to_string(&path)?.lines() {
        let line = line.trim();
        if line.is_empty() || !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let Some((_, rest)) = line.split_once(". ") else {
            warn!(%line, "skipping malformed criteria line");
            continue;
        };
        let is_completed = rest.starts_with("[x]") || rest.starts_with("[X]");
        let content = match rest.split_once("] ") {
            Some((_, text)) => text.to_string(),
            None => rest.to_string(),
        };
        criteria.push(Criterion {
            content,
            is_completed,
        });
    }
    Ok(criteria)
}
