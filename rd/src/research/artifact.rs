//! Artifacts: named markdown documents owned by a single node
//!
//! Persisted under `Results/<node-path>/<name>.md` with front-matter holding
//! the user-friendly name and summary. External artifacts are user uploads;
//! commands never mutate them.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::store::{MarkdownFile, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub content: String,
    pub short_summary: String,
    pub is_external: bool,
    pub path: Option<PathBuf>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, content: impl Into<String>, short_summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            short_summary: short_summary.into(),
            is_external: false,
            path: None,
        }
    }

    pub fn external(name: impl Into<String>, content: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            short_summary: "User-provided external file".to_string(),
            is_external: true,
            path: Some(path),
        }
    }

    /// Bind the artifact to its directory and write it out.
    pub fn save_in(&mut self, dir: &Path) -> Result<(), StoreError> {
        let mut file = MarkdownFile::new(&self.name, self.content.clone());
        file.set("summary", self.short_summary.clone());
        if self.is_external {
            file.set("is_external", true);
        }
        let path = file.save_in(dir)?;
        self.path = Some(path);
        Ok(())
    }

    /// Rewrite the artifact at its known location.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Err(StoreError::Missing(PathBuf::from(&self.name)));
        };
        let mut file = MarkdownFile::new(&self.name, self.content.clone());
        file.set("summary", self.short_summary.clone());
        if self.is_external {
            file.set("is_external", true);
        }
        file.save_at(path)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = MarkdownFile::load(path)?;
        let name = file
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| path.file_stem().unwrap_or_default().to_string_lossy().to_string());
        let summary = file.get_str("summary").unwrap_or_default().to_string();
        let is_external = file
            .get("is_external")
            .and_then(serde_yaml::Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            name,
            content: file.content,
            short_summary: summary,
            is_external,
            path: Some(path.to_path_buf()),
        })
    }
}

/// Load every artifact in a node's results directory, skipping files that
/// fail to parse.
pub fn load_artifacts_from_dir(dir: &Path) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return artifacts;
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();
    for path in paths {
        match Artifact::load(&path) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable artifact"),
        }
    }
    artifacts
}
