//! Cycle budget manager
//!
//! Counts LLM cycles across all workers against an optional budget. On
//! exhaustion the operator is offered a one-shot extension of 20 cycles; a
//! declined extension latches, so every later call says stop without
//! re-prompting. The state sits behind an async mutex because the prompt
//! suspends while holding it, which also serializes concurrent workers
//! hitting exhaustion at once.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::operator::{Operator, confirm_blocking};
use crate::research::node::ResearchNode;

/// Cycles granted when the operator extends an exhausted budget
const EXTENSION_CYCLES: u32 = 20;

#[derive(Debug, Default)]
struct BudgetState {
    budget: Option<u32>,
    cycles_used: u32,
    exhausted_and_rejected: bool,
}

pub struct BudgetManager {
    inner: Mutex<BudgetState>,
    operator: Arc<dyn Operator>,
}

impl BudgetManager {
    pub fn new(operator: Arc<dyn Operator>) -> Self {
        Self {
            inner: Mutex::new(BudgetState::default()),
            operator,
        }
    }

    /// Set or clear the budget. Negative values clear it. Resets the
    /// latched refusal.
    pub async fn set_budget(&self, value: Option<i64>) {
        let mut state = self.inner.lock().await;
        state.budget = value.filter(|v| *v >= 0).map(|v| v as u32);
        state.exhausted_and_rejected = false;
        match state.budget {
            Some(budget) => info!(budget, "budget set"),
            None => info!("budget cleared (unlimited cycles)"),
        }
    }

    pub async fn budget(&self) -> Option<u32> {
        self.inner.lock().await.budget
    }

    pub async fn cycles_used(&self) -> u32 {
        self.inner.lock().await.cycles_used
    }

    /// Remaining cycles, negative once over budget. `None` when unlimited.
    pub async fn remaining(&self) -> Option<i64> {
        let state = self.inner.lock().await;
        state.budget.map(|b| i64::from(b) - i64::from(state.cycles_used))
    }

    /// Count one cycle and apply exhaustion policy. Returns true when the
    /// research should stop.
    pub async fn increment_cycles_and_manage_budget(&self, node: &ResearchNode) -> bool {
        let mut state = self.inner.lock().await;
        state.cycles_used += 1;

        let Some(budget) = state.budget else {
            return false;
        };
        if state.exhausted_and_rejected {
            return true;
        }
        if state.cycles_used <= budget {
            return false;
        }

        println!("\n===== BUDGET COMPLETELY EXHAUSTED =====");
        println!("Current usage: {} cycles (budget: {})", state.cycles_used, budget);
        let extend = confirm_blocking(
            self.operator.clone(),
            format!("Would you like to add {} more cycles to continue?", EXTENSION_CYCLES),
        )
        .await;

        if extend {
            let new_budget = budget + EXTENSION_CYCLES;
            state.budget = Some(new_budget);
            println!("Added {} more cycles. New budget ceiling: {}", EXTENSION_CYCLES, new_budget);
            node.history().aggregator_mut().add_internal_message_from(
                format!(
                    "The budget has been extended with {} additional cycles. New total: {} cycles.",
                    EXTENSION_CYCLES, new_budget
                ),
                "SYSTEM",
            );
            false
        } else {
            println!("Finishing research due to budget constraints.");
            state.exhausted_and_rejected = true;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::ScriptedOperator;
    use crate::research::Research;
    use tempfile::tempdir;

    fn node(temp: &tempfile::TempDir) -> Arc<ResearchNode> {
        let research = Research::create(temp.path(), "budget-test").unwrap();
        research.define_root_problem("x").unwrap()
    }

    #[tokio::test]
    async fn test_no_budget_never_stops() {
        let temp = tempdir().unwrap();
        let node = node(&temp);
        let manager = BudgetManager::new(Arc::new(ScriptedOperator::declining()));

        for _ in 0..100 {
            assert!(!manager.increment_cycles_and_manage_budget(&node).await);
        }
        assert_eq!(manager.cycles_used().await, 100);
    }

    #[tokio::test]
    async fn test_declined_extension_latches() {
        let temp = tempdir().unwrap();
        let node = node(&temp);
        let manager = BudgetManager::new(Arc::new(ScriptedOperator::declining()));
        manager.set_budget(Some(2)).await;

        assert!(!manager.increment_cycles_and_manage_budget(&node).await);
        assert!(!manager.increment_cycles_and_manage_budget(&node).await);
        // third cycle exceeds the budget, operator declines
        assert!(manager.increment_cycles_and_manage_budget(&node).await);
        // latched: no further prompting needed
        assert!(manager.increment_cycles_and_manage_budget(&node).await);
    }

    #[tokio::test]
    async fn test_granted_extension_continues_and_notifies() {
        let temp = tempdir().unwrap();
        let node = node(&temp);
        let manager = BudgetManager::new(Arc::new(ScriptedOperator::new(vec![true], vec![])));
        manager.set_budget(Some(1)).await;

        assert!(!manager.increment_cycles_and_manage_budget(&node).await);
        assert!(!manager.increment_cycles_and_manage_budget(&node).await, "extension granted");
        assert_eq!(manager.budget().await, Some(21));

        let history = node.history();
        let reply = history.aggregator().compile();
        assert!(reply.messages.iter().any(|m| m.source == "SYSTEM" && m.content.contains("extended")));
    }

    #[tokio::test]
    async fn test_negative_budget_clears() {
        let temp = tempdir().unwrap();
        let _node = node(&temp);
        let manager = BudgetManager::new(Arc::new(ScriptedOperator::declining()));
        manager.set_budget(Some(-5)).await;
        assert_eq!(manager.budget().await, None);
    }

    #[tokio::test]
    async fn test_remaining_goes_negative() {
        let temp = tempdir().unwrap();
        let node = node(&temp);
        let manager = BudgetManager::new(Arc::new(ScriptedOperator::new(vec![true], vec![])));
        manager.set_budget(Some(1)).await;

        manager.increment_cycles_and_manage_budget(&node).await;
        assert_eq!(manager.remaining().await, Some(0));
    }
}
