//! Task tree: the scheduling view over a research tree
//!
//! `next()` blocks until a node is ready to run, handing nodes out in
//! depth-first creation order, or returns `None` once every node in the
//! (possibly focused) subtree is terminal. Nodes publish a status-change
//! event on every transition; the engine is the only consumer.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::research::node::ResearchNode;
use crate::research::state::ProblemStatus;

/// Event published by a node when its status changes
#[derive(Debug, Clone, Copy)]
pub enum NodeEvent {
    StatusChanged,
}

/// Cloneable publishing half of the task-tree event queue
#[derive(Debug, Clone)]
pub struct TreeEvents {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl TreeEvents {
    /// Publish an event. A closed queue (engine shut down) is not an error.
    pub fn publish(&self, event: NodeEvent) {
        let _ = self.tx.send(event);
    }
}

/// The scheduler over one research tree
pub struct TaskTree {
    events_tx: mpsc::UnboundedSender<NodeEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<NodeEvent>>,
    root: Mutex<Option<Arc<ResearchNode>>>,
    focused: Mutex<Option<Arc<ResearchNode>>>,
}

impl TaskTree {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            events_tx: tx,
            events_rx: tokio::sync::Mutex::new(rx),
            root: Mutex::new(None),
            focused: Mutex::new(None),
        })
    }

    /// Publishing handle given to every node at construction.
    pub fn events(&self) -> TreeEvents {
        TreeEvents {
            tx: self.events_tx.clone(),
        }
    }

    pub fn set_root(&self, root: Arc<ResearchNode>) {
        *self.root.lock().expect("tree root lock poisoned") = Some(root);
    }

    /// Restrict scheduling to one branch; `None` restores the full tree.
    pub fn set_focused_subtree(&self, node: Option<Arc<ResearchNode>>) {
        *self.focused.lock().expect("tree focus lock poisoned") = node;
    }

    pub fn get_focused_subtree(&self) -> Option<Arc<ResearchNode>> {
        self.focused.lock().expect("tree focus lock poisoned").clone()
    }

    fn search_root(&self) -> Option<Arc<ResearchNode>> {
        self.get_focused_subtree()
            .or_else(|| self.root.lock().expect("tree root lock poisoned").clone())
    }

    /// Block until a node is ready, or return `None` once the subtree is
    /// entirely terminal. An empty tree returns `None` immediately.
    pub async fn next(&self) -> Option<Arc<ResearchNode>> {
        loop {
            if let Some(node) = self.find_next_available() {
                debug!(node = %node.title(), "scheduler handing out ready node");
                return Some(node);
            }
            if self.is_finished() {
                return None;
            }

            let mut rx = self.events_rx.lock().await;
            rx.recv().await?;
            // Collapse any burst of transitions into a single rescan
            while rx.try_recv().is_ok() {}
        }
    }

    /// Depth-first scan for the first `READY_TO_START` node, children in
    /// creation order.
    fn find_next_available(&self) -> Option<Arc<ResearchNode>> {
        let mut stack = vec![self.search_root()?];
        while let Some(node) = stack.pop() {
            if node.status() == ProblemStatus::ReadyToStart {
                return Some(node);
            }
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
        None
    }

    /// True when every node in the (focused) subtree is terminal. A tree
    /// with no root is vacuously finished.
    pub fn is_finished(&self) -> bool {
        let Some(root) = self.search_root() else {
            return true;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !node.status().is_terminal() {
                return false;
            }
            stack.extend(node.children());
        }
        true
    }

    /// Test helper: pull one event without blocking.
    #[doc(hidden)]
    pub fn try_recv_event(&self) -> bool {
        self.events_rx.blocking_lock().try_recv().is_ok()
    }
}
