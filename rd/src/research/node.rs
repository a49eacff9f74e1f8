//! Research node: one sub-problem in the research tree
//!
//! A node owns its children, criteria, artifacts, state and history. Nodes
//! are shared between the scheduler and workers as `Arc`s with a `Weak`
//! parent link; every mutable component sits behind its own mutex, none of
//! which is ever held across an `.await`.
//!
//! Lock order is strictly child-state -> parent-state (termination
//! bookkeeping) and state locks are never held while taking a history lock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use eyre::{Result, bail};
use tracing::{debug, warn};

use crate::store::{DualStore, MarkdownFile, create_dir_all};
use crate::tree::{NodeEvent, TreeEvents};

use super::artifact::{Artifact, load_artifacts_from_dir};
use super::criteria::{Criterion, load_criteria, save_criteria};
use super::history::NodeHistory;
use super::logger::NodeLogger;
use super::state::{NodeState, ProblemStatus};

pub const PROBLEM_DEFINITION_NAME: &str = "Problem Definition";
pub const SUBPROBLEMS_DIR: &str = "Subproblems";
pub const NODE_STATE_FILE: &str = "node_state.json";
pub const HISTORY_FILE: &str = "history.json";

/// Maximum node title length before clamping
const MAX_TITLE_LENGTH: usize = 200;

pub struct ResearchNode {
    title: String,
    path: PathBuf,
    parent: Weak<ResearchNode>,
    store: Arc<DualStore>,
    events: TreeEvents,
    logger: NodeLogger,
    children: Mutex<Vec<Arc<ResearchNode>>>,
    problem_content: Mutex<String>,
    criteria: Mutex<Vec<Criterion>>,
    artifacts: Mutex<Vec<Artifact>>,
    state: Mutex<NodeState>,
    history: Mutex<NodeHistory>,
}

impl ResearchNode {
    /// Create or reopen the node at `path`. A fresh node persists its
    /// problem definition; an existing one re-reads everything from disk.
    pub fn new(
        title: &str,
        problem_content: &str,
        path: PathBuf,
        parent: Option<&Arc<ResearchNode>>,
        store: Arc<DualStore>,
        events: TreeEvents,
    ) -> Result<Arc<Self>> {
        create_dir_all(&path)?;
        create_dir_all(&path.join(SUBPROBLEMS_DIR))?;

        let problem_content = if MarkdownFile::exists(&path, PROBLEM_DEFINITION_NAME) {
            MarkdownFile::load_named(&path, PROBLEM_DEFINITION_NAME)?.content
        } else {
            let file = MarkdownFile::new(PROBLEM_DEFINITION_NAME, problem_content);
            file.save_in(&path)?;
            problem_content.to_string()
        };

        let state_path = path.join(NODE_STATE_FILE);
        let state = match NodeState::load(&state_path)? {
            Some(state) => state,
            None => {
                let state = NodeState::new();
                state.save(&state_path)?;
                state
            }
        };

        let criteria = load_criteria(&path)?;
        let artifact_dir = store.artifact_dir_for_node(&path)?;
        let artifacts = load_artifacts_from_dir(&artifact_dir);
        let history = NodeHistory::open(path.join(HISTORY_FILE));

        let node = Arc::new(Self {
            title: clamp_title(title),
            logger: NodeLogger::new(&path),
            path,
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            store,
            events,
            children: Mutex::new(Vec::new()),
            problem_content: Mutex::new(problem_content),
            criteria: Mutex::new(criteria),
            artifacts: Mutex::new(artifacts),
            state: Mutex::new(state),
            history: Mutex::new(history),
        });
        debug!(title = %node.title, id = %node.id(), "node opened");
        Ok(node)
    }

    /// Recursively load a node and its children. Children whose directory
    /// lacks a problem definition, or that fail to load, are skipped.
    pub fn load_from_directory(
        path: &Path,
        parent: Option<&Arc<ResearchNode>>,
        store: Arc<DualStore>,
        events: TreeEvents,
    ) -> Result<Arc<Self>> {
        if !MarkdownFile::exists(path, PROBLEM_DEFINITION_NAME) {
            bail!("problem definition not found at {}", path.display());
        }
        let title = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        let node = Self::new(&title, "", path.to_path_buf(), parent, store.clone(), events.clone())?;

        let subproblems = path.join(SUBPROBLEMS_DIR);
        if subproblems.is_dir() {
            let mut child_dirs: Vec<PathBuf> = std::fs::read_dir(&subproblems)
                .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).filter(|p| p.is_dir()).collect())
                .unwrap_or_default();
            child_dirs.sort();
            for child_dir in child_dirs {
                if !MarkdownFile::exists(&child_dir, PROBLEM_DEFINITION_NAME) {
                    continue;
                }
                match Self::load_from_directory(&child_dir, Some(&node), store.clone(), events.clone()) {
                    Ok(child) => node.children.lock().expect("children lock poisoned").push(child),
                    Err(e) => warn!(path = %child_dir.display(), error = %e, "skipping unloadable child node"),
                }
            }
        }
        Ok(node)
    }

    pub fn id(&self) -> String {
        self.state.lock().expect("state lock poisoned").id.clone()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn logger(&self) -> &NodeLogger {
        &self.logger
    }

    pub fn store(&self) -> &Arc<DualStore> {
        &self.store
    }

    pub fn parent(&self) -> Option<Arc<ResearchNode>> {
        self.parent.upgrade()
    }

    pub fn children(&self) -> Vec<Arc<ResearchNode>> {
        self.children.lock().expect("children lock poisoned").clone()
    }

    pub fn child_by_title(&self, title: &str) -> Option<Arc<ResearchNode>> {
        self.children().into_iter().find(|c| c.title() == title)
    }

    pub fn depth_from_root(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.depth_from_root() + 1,
            None => 0,
        }
    }

    /// Create a child under `Subproblems/<title>/`. Titles are unique
    /// within a parent.
    pub fn create_child(self: &Arc<Self>, title: &str, problem_content: &str) -> Result<Arc<ResearchNode>> {
        let title = clamp_title(title);
        if self.child_by_title(&title).is_some() {
            bail!("Subproblem '{}' already exists", title);
        }
        let child_path = self.path.join(SUBPROBLEMS_DIR).join(&title);
        let child = ResearchNode::new(
            &title,
            problem_content,
            child_path,
            Some(self),
            self.store.clone(),
            self.events.clone(),
        )?;
        self.children.lock().expect("children lock poisoned").push(child.clone());
        Ok(child)
    }

    // ---- problem definition ----

    pub fn problem_content(&self) -> String {
        self.problem_content.lock().expect("problem lock poisoned").clone()
    }

    /// Append to the definition with the `UPDATE` marker and persist.
    pub fn append_to_problem_definition(&self, content: &str) -> Result<()> {
        let mut problem = self.problem_content.lock().expect("problem lock poisoned");
        problem.push_str("\n\nUPDATE\n");
        problem.push_str(content);
        let file = MarkdownFile::new(PROBLEM_DEFINITION_NAME, problem.clone());
        file.save_in(&self.path)?;
        Ok(())
    }

    // ---- criteria ----

    pub fn criteria(&self) -> Vec<Criterion> {
        self.criteria.lock().expect("criteria lock poisoned").clone()
    }

    /// Add a criterion, returning its index. An exact duplicate returns the
    /// existing index without mutation.
    pub fn add_criterion(&self, content: &str) -> Result<usize> {
        let mut criteria = self.criteria.lock().expect("criteria lock poisoned");
        if let Some(index) = criteria.iter().position(|c| c.content == content) {
            return Ok(index);
        }
        criteria.push(Criterion::new(content));
        save_criteria(&self.path, &criteria)?;
        Ok(criteria.len() - 1)
    }

    /// Mark the 0-based criterion done. Returns false when out of range.
    pub fn mark_criterion_done(&self, index: usize) -> Result<bool> {
        let mut criteria = self.criteria.lock().expect("criteria lock poisoned");
        let Some(criterion) = criteria.get_mut(index) else {
            return Ok(false);
        };
        criterion.is_completed = true;
        save_criteria(&self.path, &criteria)?;
        Ok(true)
    }

    pub fn criteria_met_count(&self) -> usize {
        self.criteria.lock().expect("criteria lock poisoned").iter().filter(|c| c.is_completed).count()
    }

    pub fn criteria_total_count(&self) -> usize {
        self.criteria.lock().expect("criteria lock poisoned").len()
    }

    // ---- artifacts ----

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().expect("artifacts lock poisoned").clone()
    }

    pub fn artifact_named(&self, name: &str) -> Option<Artifact> {
        self.artifacts.lock().expect("artifacts lock poisoned").iter().find(|a| a.name == name).cloned()
    }

    /// Add an owned artifact. Names are unique within a node; a fresh
    /// artifact starts open.
    pub fn add_artifact(&self, mut artifact: Artifact) -> Result<()> {
        let mut artifacts = self.artifacts.lock().expect("artifacts lock poisoned");
        if artifacts.iter().any(|a| a.name == artifact.name) {
            bail!("One node can't have multiple artifacts with the same name");
        }
        let dir = self.store.artifact_dir_for_node(&self.path)?;
        artifact.save_in(&dir)?;
        let name = artifact.name.clone();
        artifacts.push(artifact);
        drop(artifacts);

        let mut state = self.state.lock().expect("state lock poisoned");
        state.set_artifact_status(&name, true);
        state.save(&self.path.join(NODE_STATE_FILE))?;
        Ok(())
    }

    /// Apply a mutation to a named non-external artifact and persist it.
    /// Returns false when no artifact matches.
    pub fn modify_artifact(&self, name: &str, mutate: impl FnOnce(&mut Artifact)) -> Result<bool> {
        let mut artifacts = self.artifacts.lock().expect("artifacts lock poisoned");
        let Some(artifact) = artifacts.iter_mut().find(|a| a.name == name) else {
            return Ok(false);
        };
        if artifact.is_external {
            bail!("Cannot modify external artifact '{}'", name);
        }
        mutate(artifact);
        artifact.save()?;
        Ok(true)
    }

    /// Delete a named non-external artifact and its file. Returns false
    /// when no artifact matches.
    pub fn remove_artifact(&self, name: &str) -> Result<bool> {
        let mut artifacts = self.artifacts.lock().expect("artifacts lock poisoned");
        let Some(index) = artifacts.iter().position(|a| a.name == name) else {
            return Ok(false);
        };
        if artifacts[index].is_external {
            bail!("Cannot delete external artifact '{}'", name);
        }
        let removed = artifacts.remove(index);
        drop(artifacts);
        if let Some(path) = removed.path
            && path.exists()
        {
            std::fs::remove_file(&path).map_err(|e| crate::store::StoreError::io(&path, e))?;
        }
        Ok(true)
    }

    /// Flip an artifact's visibility on this node's state. Opening records
    /// the current iteration for auto-close.
    pub fn set_artifact_visibility(&self, artifact_name: &str, open: bool) -> Result<()> {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.set_artifact_status(artifact_name, open);
        state.save(&self.path.join(NODE_STATE_FILE))?;
        Ok(())
    }

    /// Visibility query; triggers the lazy auto-close check.
    pub fn artifact_visibility(&self, artifact_name: &str) -> bool {
        let mut state = self.state.lock().expect("state lock poisoned");
        let before = state.clone();
        let open = state.artifact_visibility(artifact_name);
        if *state != before {
            let _ = state.save(&self.path.join(NODE_STATE_FILE));
        }
        open
    }

    // ---- status machine ----

    pub fn status(&self) -> ProblemStatus {
        self.state.lock().expect("state lock poisoned").problem_status
    }

    pub fn node_state(&self) -> NodeState {
        self.state.lock().expect("state lock poisoned").clone()
    }

    /// Transition to `status`. A no-op when the value is unchanged;
    /// otherwise the change is persisted, an event is published after the
    /// field is updated, and a terminal transition removes this node from
    /// its parent's pending set.
    pub fn set_status(&self, status: ProblemStatus) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if state.problem_status == status {
                return;
            }
            state.set_status(status);
            if let Err(e) = state.save(&self.path.join(NODE_STATE_FILE)) {
                warn!(node = %self.title, error = %e, "failed to persist status change");
            }
        }
        debug!(node = %self.title, status = %status, "status changed");
        self.events.publish(NodeEvent::StatusChanged);

        if status.is_terminal()
            && let Some(parent) = self.parent()
        {
            parent.remove_pending_child(&self.id());
        }
    }

    /// Register a child to wait on and move this node to `PENDING`.
    pub fn add_pending_child(&self, child_id: &str) {
        let changed = {
            let mut state = self.state.lock().expect("state lock poisoned");
            state.pending_child_node_ids.insert(child_id.to_string());
            let changed = state.problem_status != ProblemStatus::Pending;
            if changed {
                state.set_status(ProblemStatus::Pending);
            }
            if let Err(e) = state.save(&self.path.join(NODE_STATE_FILE)) {
                warn!(node = %self.title, error = %e, "failed to persist pending child");
            }
            changed
        };
        if changed {
            self.events.publish(NodeEvent::StatusChanged);
        }
    }

    /// Drop a terminated child from the pending set; when the set empties
    /// while this node is `PENDING`, it wakes up as `READY_TO_START`.
    pub fn remove_pending_child(&self, child_id: &str) {
        let woke_up = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if !state.pending_child_node_ids.remove(child_id) {
                return;
            }
            let woke_up =
                state.pending_child_node_ids.is_empty() && state.problem_status == ProblemStatus::Pending;
            if woke_up {
                state.set_status(ProblemStatus::ReadyToStart);
            }
            if let Err(e) = state.save(&self.path.join(NODE_STATE_FILE)) {
                warn!(node = %self.title, error = %e, "failed to persist pending child removal");
            }
            woke_up
        };
        if woke_up {
            debug!(node = %self.title, "last awaited child finished, ready to start");
            self.events.publish(NodeEvent::StatusChanged);
        }
    }

    pub fn increment_iteration(&self) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.increment_iteration();
        if let Err(e) = state.save(&self.path.join(NODE_STATE_FILE)) {
            warn!(node = %self.title, error = %e, "failed to persist iteration counter");
        }
    }

    pub fn current_iteration(&self) -> u32 {
        self.state.lock().expect("state lock poisoned").current_iteration
    }

    pub fn resolution_message(&self) -> Option<String> {
        self.state.lock().expect("state lock poisoned").resolution_message.clone()
    }

    pub fn set_resolution_message(&self, message: Option<String>) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.resolution_message = message;
        if let Err(e) = state.save(&self.path.join(NODE_STATE_FILE)) {
            warn!(node = %self.title, error = %e, "failed to persist resolution message");
        }
    }

    // ---- history ----

    pub fn history(&self) -> MutexGuard<'_, NodeHistory> {
        self.history.lock().expect("history lock poisoned")
    }
}

impl std::fmt::Debug for ResearchNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchNode")
            .field("title", &self.title)
            .field("path", &self.path)
            .field("status", &self.status())
            .finish()
    }
}

fn clamp_title(title: &str) -> String {
    if title.chars().count() > MAX_TITLE_LENGTH {
        let clamped: String = title.chars().take(MAX_TITLE_LENGTH).collect();
        format!("{}...", clamped)
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TaskTree;
    use tempfile::tempdir;

    fn test_node(temp: &tempfile::TempDir) -> (Arc<ResearchNode>, Arc<TaskTree>) {
        let store = Arc::new(DualStore::create(temp.path(), "test").unwrap());
        let tree = TaskTree::new();
        let node = ResearchNode::new(
            "Root Problem",
            "Investigate the thing",
            store.research_dir().to_path_buf(),
            None,
            store,
            tree.events(),
        )
        .unwrap();
        (node, tree)
    }

    #[test]
    fn test_new_node_persists_problem_definition() {
        let temp = tempdir().unwrap();
        let (node, _tree) = test_node(&temp);

        assert!(MarkdownFile::exists(node.path(), PROBLEM_DEFINITION_NAME));
        assert_eq!(node.problem_content(), "Investigate the thing");
        assert_eq!(node.status(), ProblemStatus::Created);
        assert!(node.path().join(SUBPROBLEMS_DIR).is_dir());
    }

    #[test]
    fn test_title_clamped_to_200_chars() {
        let temp = tempdir().unwrap();
        let store = Arc::new(DualStore::create(temp.path(), "test").unwrap());
        let tree = TaskTree::new();
        let long_title = "x".repeat(250);
        let node = ResearchNode::new(
            &long_title,
            "content",
            store.research_dir().to_path_buf(),
            None,
            store,
            tree.events(),
        )
        .unwrap();
        assert_eq!(node.title().chars().count(), 203);
        assert!(node.title().ends_with("..."));
    }

    #[test]
    fn test_create_child_rejects_duplicate_title() {
        let temp = tempdir().unwrap();
        let (node, _tree) = test_node(&temp);

        node.create_child("Child", "child content").unwrap();
        assert!(node.create_child("Child", "again").is_err());
        assert_eq!(node.children().len(), 1);
    }

    #[test]
    fn test_criterion_dedup_returns_existing_index() {
        let temp = tempdir().unwrap();
        let (node, _tree) = test_node(&temp);

        assert_eq!(node.add_criterion("check a").unwrap(), 0);
        assert_eq!(node.add_criterion("check b").unwrap(), 1);
        assert_eq!(node.add_criterion("check a").unwrap(), 0);
        assert_eq!(node.criteria_total_count(), 2);
    }

    #[test]
    fn test_mark_criterion_out_of_range() {
        let temp = tempdir().unwrap();
        let (node, _tree) = test_node(&temp);
        node.add_criterion("only one").unwrap();

        assert!(node.mark_criterion_done(0).unwrap());
        assert!(!node.mark_criterion_done(5).unwrap());
        assert_eq!(node.criteria_met_count(), 1);
    }

    #[test]
    fn test_artifact_names_unique_within_node() {
        let temp = tempdir().unwrap();
        let (node, _tree) = test_node(&temp);

        node.add_artifact(Artifact::new("A", "c", "s")).unwrap();
        assert!(node.add_artifact(Artifact::new("A", "other", "s")).is_err());
        assert_eq!(node.artifacts().len(), 1);
    }

    #[test]
    fn test_artifact_lands_in_results_tree() {
        let temp = tempdir().unwrap();
        let (node, _tree) = test_node(&temp);

        node.add_artifact(Artifact::new("Report", "content", "summary")).unwrap();

        let expected = node.store().artifact_dir_for_node(node.path()).unwrap().join("Report.md");
        assert!(expected.exists());
        assert!(node.artifact_visibility("Report"), "new artifacts start open");
    }

    #[test]
    fn test_modify_external_artifact_rejected() {
        let temp = tempdir().unwrap();
        let (node, _tree) = test_node(&temp);
        let dir = node.store().artifact_dir_for_node(node.path()).unwrap();
        {
            let mut artifacts = node.artifacts.lock().unwrap();
            artifacts.push(Artifact::external("upload", "raw", dir.join("upload.md")));
        }

        assert!(node.modify_artifact("upload", |a| a.content.push('x')).is_err());
        assert!(node.remove_artifact("upload").is_err());
    }

    #[test]
    fn test_terminal_child_removed_from_parent_pending_set() {
        let temp = tempdir().unwrap();
        let (root, _tree) = test_node(&temp);
        let child = root.create_child("Child", "content").unwrap();

        root.add_pending_child(&child.id());
        assert_eq!(root.status(), ProblemStatus::Pending);
        assert!(root.node_state().pending_child_node_ids.contains(&child.id()));

        child.set_status(ProblemStatus::Finished);

        assert!(root.node_state().pending_child_node_ids.is_empty());
        assert_eq!(root.status(), ProblemStatus::ReadyToStart);
    }

    #[test]
    fn test_pending_parent_waits_for_all_children() {
        let temp = tempdir().unwrap();
        let (root, _tree) = test_node(&temp);
        let a = root.create_child("A", "c").unwrap();
        let b = root.create_child("B", "c").unwrap();

        root.add_pending_child(&a.id());
        root.add_pending_child(&b.id());

        a.set_status(ProblemStatus::Finished);
        assert_eq!(root.status(), ProblemStatus::Pending);

        b.set_status(ProblemStatus::Cancelled);
        assert_eq!(root.status(), ProblemStatus::ReadyToStart);
    }

    #[test]
    fn test_status_change_publishes_event() {
        let temp = tempdir().unwrap();
        let (node, tree) = test_node(&temp);

        node.set_status(ProblemStatus::ReadyToStart);
        assert!(tree.try_recv_event(), "transition publishes an event");

        node.set_status(ProblemStatus::ReadyToStart);
        assert!(!tree.try_recv_event(), "no event for a no-op transition");
    }

    #[test]
    fn test_reload_preserves_identity_and_content() {
        let temp = tempdir().unwrap();
        let store = Arc::new(DualStore::create(temp.path(), "test").unwrap());
        let tree = TaskTree::new();
        let id;
        {
            let node = ResearchNode::new(
                "Root",
                "original content",
                store.research_dir().to_path_buf(),
                None,
                store.clone(),
                tree.events(),
            )
            .unwrap();
            node.add_criterion("check one").unwrap();
            node.mark_criterion_done(0).unwrap();
            node.create_child("Child A", "child content").unwrap();
            node.set_status(ProblemStatus::Finished);
            id = node.id();
        }

        let tree2 = TaskTree::new();
        let reloaded =
            ResearchNode::load_from_directory(store.research_dir(), None, store.clone(), tree2.events()).unwrap();

        assert_eq!(reloaded.id(), id);
        assert_eq!(reloaded.problem_content(), "original content");
        assert_eq!(reloaded.status(), ProblemStatus::Finished);
        assert_eq!(reloaded.criteria().len(), 1);
        assert!(reloaded.criteria()[0].is_completed);
        assert_eq!(reloaded.children().len(), 1);
        assert_eq!(reloaded.children()[0].title(), "Child A");
        assert_eq!(reloaded.children()[0].depth_from_root(), 1);
    }

    #[test]
    fn test_reload_skips_broken_child() {
        let temp = tempdir().unwrap();
        let store = Arc::new(DualStore::create(temp.path(), "test").unwrap());
        let tree = TaskTree::new();
        {
            let node = ResearchNode::new(
                "Root",
                "content",
                store.research_dir().to_path_buf(),
                None,
                store.clone(),
                tree.events(),
            )
            .unwrap();
            node.create_child("Good", "fine").unwrap();
        }
        // A subproblem directory without a problem definition
        std::fs::create_dir_all(store.research_dir().join(SUBPROBLEMS_DIR).join("Broken")).unwrap();

        let tree2 = TaskTree::new();
        let research_dir = store.research_dir().to_path_buf();
        let reloaded =
            ResearchNode::load_from_directory(&research_dir, None, store, tree2.events()).unwrap();
        assert_eq!(reloaded.children().len(), 1);
    }
}
