//! Repository: the root directory owning every named research
//!
//! All researches share a single knowledge base. On startup the repo scans
//! `Research/` for subdirectories (skipping `_`-prefixed names) and loads
//! any research whose root problem definition exists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use eyre::Result;
use tracing::{info, warn};

use crate::store::{KNOWLEDGEBASE_DIR, RESEARCH_DIR, create_dir_all};
use crate::tree::TaskTree;

use super::Research;
use super::artifact::Artifact;
use super::knowledge::KnowledgeBase;
use super::node::ResearchNode;

pub struct Repo {
    root: PathBuf,
    knowledge_base: Arc<KnowledgeBase>,
    researches: Mutex<BTreeMap<String, Arc<Research>>>,
}

impl Repo {
    /// Open the repository at `root`, loading every existing research.
    pub fn open(root: &Path) -> Result<Self> {
        create_dir_all(&root.join(RESEARCH_DIR))?;
        let knowledge_base = Arc::new(KnowledgeBase::new(root.join(KNOWLEDGEBASE_DIR)));
        knowledge_base.load_entries();

        let repo = Self {
            root: root.to_path_buf(),
            knowledge_base,
            researches: Mutex::new(BTreeMap::new()),
        };
        repo.scan_existing()?;
        Ok(repo)
    }

    fn scan_existing(&self) -> Result<()> {
        let research_base = self.root.join(RESEARCH_DIR);
        let mut names: Vec<String> = std::fs::read_dir(&research_base)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .filter(|name| !name.starts_with('_'))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();

        for name in names {
            let research = Research::with_knowledge_base(&self.root, &name, self.knowledge_base.clone())?;
            if research.research_already_exists() {
                if let Err(e) = research.load_existing() {
                    warn!(research = %name, error = %e, "failed to load research, registering empty");
                }
            }
            self.researches.lock().expect("repo lock poisoned").insert(name.clone(), research);
            info!(research = %name, "registered research instance");
        }
        Ok(())
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }

    /// Create a research, or return the existing instance of that name.
    pub fn create_research(&self, name: &str) -> Result<Arc<Research>> {
        if let Some(existing) = self.get_research(name) {
            return Ok(existing);
        }
        let research = Research::with_knowledge_base(&self.root, name, self.knowledge_base.clone())?;
        self.researches
            .lock()
            .expect("repo lock poisoned")
            .insert(name.to_string(), research.clone());
        Ok(research)
    }

    pub fn get_research(&self, name: &str) -> Option<Arc<Research>> {
        self.researches.lock().expect("repo lock poisoned").get(name).cloned()
    }

    pub fn list_research_instances(&self) -> Vec<String> {
        self.researches.lock().expect("repo lock poisoned").keys().cloned().collect()
    }

    pub fn get_task_tree(&self, name: &str) -> Option<Arc<TaskTree>> {
        self.get_research(name).map(|r| r.task_tree().clone())
    }

    /// Search artifact names across every research instance.
    pub fn search_artifacts_across_all(&self, name: &str) -> Vec<(String, Arc<ResearchNode>, Artifact)> {
        let researches: Vec<Arc<Research>> =
            self.researches.lock().expect("repo lock poisoned").values().cloned().collect();
        let mut results = Vec::new();
        for research in researches {
            for (node, artifact) in research.search_artifacts(name) {
                results.push((research.name().to_string(), node, artifact));
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_research_is_idempotent() {
        let temp = tempdir().unwrap();
        let repo = Repo::open(temp.path()).unwrap();

        let a = repo.create_research("alpha").unwrap();
        let b = repo.create_research("alpha").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(repo.list_research_instances(), vec!["alpha".to_string()]);
    }

    #[test]
    fn test_startup_scan_skips_underscore_dirs() {
        let temp = tempdir().unwrap();
        {
            let repo = Repo::open(temp.path()).unwrap();
            let research = repo.create_research("alpha").unwrap();
            research.define_root_problem("study X").unwrap();
        }
        std::fs::create_dir_all(temp.path().join(RESEARCH_DIR).join("_internal")).unwrap();

        let repo = Repo::open(temp.path()).unwrap();
        assert_eq!(repo.list_research_instances(), vec!["alpha".to_string()]);
        let research = repo.get_research("alpha").unwrap();
        assert!(research.has_root_problem_defined());
    }

    #[test]
    fn test_task_tree_lookup() {
        let temp = tempdir().unwrap();
        let repo = Repo::open(temp.path()).unwrap();
        repo.create_research("alpha").unwrap();

        assert!(repo.get_task_tree("alpha").is_some());
        assert!(repo.get_task_tree("missing").is_none());
    }

    #[test]
    fn test_cross_research_artifact_search() {
        let temp = tempdir().unwrap();
        let repo = Repo::open(temp.path()).unwrap();

        let alpha = repo.create_research("alpha").unwrap();
        let alpha_root = alpha.define_root_problem("a").unwrap();
        alpha_root.add_artifact(Artifact::new("Shared Findings", "x", "s")).unwrap();

        let beta = repo.create_research("beta").unwrap();
        let beta_root = beta.define_root_problem("b").unwrap();
        beta_root.add_artifact(Artifact::new("Findings Too", "y", "s")).unwrap();

        let hits = repo.search_artifacts_across_all("findings");
        assert_eq!(hits.len(), 2);
        let names: Vec<&str> = hits.iter().map(|(research, _, _)| research.as_str()).collect();
        assert!(names.contains(&"alpha") && names.contains(&"beta"));
    }

    #[test]
    fn test_shared_knowledge_base_across_researches() {
        let temp = tempdir().unwrap();
        let repo = Repo::open(temp.path()).unwrap();
        let alpha = repo.create_research("alpha").unwrap();
        let beta = repo.create_research("beta").unwrap();

        assert!(Arc::ptr_eq(alpha.knowledge_base(), beta.knowledge_base()));
    }
}
