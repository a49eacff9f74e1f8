//! Dual-directory file store
//!
//! Persistent state lives in two parallel trees that mirror the node
//! hierarchy: `Research/<name>/` holds problem definitions, history, state
//! and logs, while `Results/<name>/` holds artifacts only. The mapping is
//! path-isomorphic: an artifact directory is derived from a node's
//! `Research/` path by swapping the root prefix.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

mod markdown;

pub use markdown::{MarkdownFile, sanitize_filename};

/// Name of the research-side tree under the repository root
pub const RESEARCH_DIR: &str = "Research";

/// Name of the results-side tree under the repository root
pub const RESULTS_DIR: &str = "Results";

/// Name of the shared knowledge base directory under the repository root
pub const KNOWLEDGEBASE_DIR: &str = "Knowledgebase";

/// Errors raised by the file store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("path {path} is not under {root}")]
    ForeignPath { path: PathBuf, root: PathBuf },

    #[error("missing file: {0}")]
    Missing(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The two parallel directory trees of a single research instance.
#[derive(Debug, Clone)]
pub struct DualStore {
    research_dir: PathBuf,
    results_dir: PathBuf,
}

impl DualStore {
    /// Create (idempotently) the store for one named research under `root`.
    pub fn create(root: &Path, research_name: &str) -> Result<Self, StoreError> {
        let research_dir = root.join(RESEARCH_DIR).join(research_name);
        let results_dir = root.join(RESULTS_DIR).join(research_name);
        create_dir_all(&research_dir)?;
        create_dir_all(&results_dir)?;
        debug!(research = %research_dir.display(), results = %results_dir.display(), "store created");
        Ok(Self {
            research_dir,
            results_dir,
        })
    }

    /// Root of the `Research/<name>/` tree; this is also the root node path.
    pub fn research_dir(&self) -> &Path {
        &self.research_dir
    }

    /// Root of the `Results/<name>/` tree.
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Map a node path in the research tree to its artifact directory in
    /// the results tree.
    pub fn artifact_dir_for_node(&self, node_path: &Path) -> Result<PathBuf, StoreError> {
        let relative = node_path
            .strip_prefix(&self.research_dir)
            .map_err(|_| StoreError::ForeignPath {
                path: node_path.to_path_buf(),
                root: self.research_dir.clone(),
            })?;
        Ok(self.results_dir.join(relative))
    }

    /// The artifact path relative to the repository root, for report output.
    pub fn artifact_relative_path(&self, node_path: &Path, artifact_name: &str) -> Result<PathBuf, StoreError> {
        let dir = self.artifact_dir_for_node(node_path)?;
        let file = sanitize_filename(artifact_name);
        // Results/<name>/... is two levels below the repository root
        let repo_root = self
            .results_dir
            .parent()
            .and_then(Path::parent)
            .unwrap_or(&self.results_dir);
        let full = dir.join(file);
        Ok(full.strip_prefix(repo_root).unwrap_or(&full).to_path_buf())
    }
}

/// Idempotent directory creation with path context on failure
pub fn create_dir_all(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|e| StoreError::io(path, e))
}

/// Read a file to string with path context on failure
pub fn read_to_string(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|e| StoreError::io(path, e))
}

/// Write a file, creating parent directories first
pub fn write_file(path: &Path, content: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    fs::write(path, content).map_err(|e| StoreError::io(path, e))
}
