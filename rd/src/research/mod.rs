//! Research: one named tree of research nodes with its shared services
//!
//! A research owns its root node and task tree, a permanent log, external
//! files, and a handle to the repository-wide knowledge base.

use std::path::Path;
use std::sync::{Arc, Mutex};

use eyre::{Context, Result, bail};
use tracing::info;

use crate::store::{DualStore, KNOWLEDGEBASE_DIR, MarkdownFile};
use crate::tree::TaskTree;

pub mod artifact;
pub mod criteria;
pub mod external;
pub mod history;
pub mod interface;
pub mod knowledge;
pub mod logger;
pub mod node;
pub mod permanent_log;
pub mod render;
pub mod repo;
pub mod sections;
pub mod state;

use artifact::Artifact;
use external::{EXTERNAL_FILES_DIR, ExternalFilesManager};
use knowledge::KnowledgeBase;
use node::{PROBLEM_DEFINITION_NAME, ResearchNode};
use permanent_log::PermanentLogs;

pub const PERMANENT_LOGS_FILE: &str = "_permanent_logs.txt";

pub struct Research {
    name: String,
    store: Arc<DualStore>,
    tree: Arc<TaskTree>,
    root: Mutex<Option<Arc<ResearchNode>>>,
    permanent_logs: PermanentLogs,
    external_files: ExternalFilesManager,
    knowledge_base: Arc<KnowledgeBase>,
}

impl Research {
    /// Open (or create) a research with its own knowledge base under
    /// `repo_root`. Repositories with multiple researches share one
    /// knowledge base instead via [`Research::with_knowledge_base`].
    pub fn create(repo_root: &Path, name: &str) -> Result<Arc<Self>> {
        let knowledge_base = Arc::new(KnowledgeBase::new(repo_root.join(KNOWLEDGEBASE_DIR)));
        knowledge_base.load_entries();
        Self::with_knowledge_base(repo_root, name, knowledge_base)
    }

    pub fn with_knowledge_base(repo_root: &Path, name: &str, knowledge_base: Arc<KnowledgeBase>) -> Result<Arc<Self>> {
        let store = Arc::new(DualStore::create(repo_root, name).context("creating research store")?);
        let research_dir = store.research_dir().to_path_buf();
        Ok(Arc::new(Self {
            name: name.to_string(),
            tree: TaskTree::new(),
            permanent_logs: PermanentLogs::open(research_dir.join(PERMANENT_LOGS_FILE)),
            external_files: ExternalFilesManager::new(research_dir.join(EXTERNAL_FILES_DIR)),
            store,
            root: Mutex::new(None),
            knowledge_base,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<DualStore> {
        &self.store
    }

    pub fn task_tree(&self) -> &Arc<TaskTree> {
        &self.tree
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }

    pub fn permanent_logs(&self) -> &PermanentLogs {
        &self.permanent_logs
    }

    pub fn external_files(&self) -> &ExternalFilesManager {
        &self.external_files
    }

    /// True when a root problem definition exists on disk.
    pub fn research_already_exists(&self) -> bool {
        MarkdownFile::exists(self.store.research_dir(), PROBLEM_DEFINITION_NAME)
    }

    pub fn has_root_problem_defined(&self) -> bool {
        self.root.lock().expect("root lock poisoned").is_some()
    }

    pub fn root_node(&self) -> Option<Arc<ResearchNode>> {
        self.root.lock().expect("root lock poisoned").clone()
    }

    /// Create the root node from a user instruction. The node takes the
    /// research's name as its title and the research directory as its path.
    pub fn define_root_problem(self: &Arc<Self>, instruction: &str) -> Result<Arc<ResearchNode>> {
        if self.has_root_problem_defined() {
            bail!("research '{}' already has a root problem", self.name);
        }
        let root = ResearchNode::new(
            &self.name,
            instruction,
            self.store.research_dir().to_path_buf(),
            None,
            self.store.clone(),
            self.tree.events(),
        )?;
        self.tree.set_root(root.clone());
        *self.root.lock().expect("root lock poisoned") = Some(root.clone());
        info!(research = %self.name, "root problem defined");
        Ok(root)
    }

    /// Load a persisted research: knowledge base entries, external files,
    /// and the node tree rooted at the research directory.
    pub fn load_existing(self: &Arc<Self>) -> Result<Arc<ResearchNode>> {
        self.knowledge_base.load_entries();
        self.external_files.load_external_files();
        let root = ResearchNode::load_from_directory(
            self.store.research_dir(),
            None,
            self.store.clone(),
            self.tree.events(),
        )?;
        self.tree.set_root(root.clone());
        *self.root.lock().expect("root lock poisoned") = Some(root.clone());
        info!(research = %self.name, "research loaded from disk");
        Ok(root)
    }

    /// Case-insensitive name-substring search over this research's
    /// artifacts. Strictly intra-research.
    pub fn search_artifacts(&self, name: &str) -> Vec<(Arc<ResearchNode>, Artifact)> {
        let needle = name.to_lowercase();
        self.collect_artifacts()
            .into_iter()
            .filter(|(_, artifact)| artifact.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Every artifact in the tree, paired with its owning node.
    pub fn collect_artifacts(&self) -> Vec<(Arc<ResearchNode>, Artifact)> {
        let mut result = Vec::new();
        let Some(root) = self.root_node() else {
            return result;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for artifact in node.artifacts() {
                result.push((node.clone(), artifact));
            }
            stack.extend(node.children());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::state::ProblemStatus;
    use tempfile::tempdir;

    #[test]
    fn test_define_root_problem_once() {
        let temp = tempdir().unwrap();
        let research = Research::create(temp.path(), "alpha").unwrap();

        assert!(!research.has_root_problem_defined());
        let root = research.define_root_problem("study X").unwrap();
        assert_eq!(root.title(), "alpha");
        assert!(research.has_root_problem_defined());
        assert!(research.define_root_problem("again").is_err());
    }

    #[test]
    fn test_search_artifacts_is_substring_and_case_insensitive() {
        let temp = tempdir().unwrap();
        let research = Research::create(temp.path(), "alpha").unwrap();
        let root = research.define_root_problem("study X").unwrap();
        let child = root.create_child("C", "c").unwrap();

        root.add_artifact(Artifact::new("Market Summary", "x", "s")).unwrap();
        child.add_artifact(Artifact::new("Notes", "y", "s")).unwrap();

        let hits = research.search_artifacts("market");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.name, "Market Summary");
        assert_eq!(research.search_artifacts("zzz").len(), 0);
        assert_eq!(research.collect_artifacts().len(), 2);
    }

    #[test]
    fn test_load_existing_round_trip() {
        let temp = tempdir().unwrap();
        {
            let research = Research::create(temp.path(), "alpha").unwrap();
            let root = research.define_root_problem("study X").unwrap();
            root.set_status(ProblemStatus::Finished);
            root.create_child("Child", "c").unwrap();
        }

        let research = Research::create(temp.path(), "alpha").unwrap();
        assert!(research.research_already_exists());
        let root = research.load_existing().unwrap();
        assert_eq!(root.status(), ProblemStatus::Finished);
        assert_eq!(root.children().len(), 1);
    }
}
