//! Operator prompts
//!
//! The engine blocks on exactly two interactive prompts: budget extension
//! (y/N) and LLM-error retry (Enter to retry, anything else to abort). Both
//! sit behind a trait so tests can script the answers; the console
//! implementation reads stdin inside `spawn_blocking`.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

/// Source of the two operator decisions
pub trait Operator: Send + Sync {
    /// Ask a yes/no question; only an explicit `y` answers yes.
    fn confirm(&self, prompt: &str) -> bool;

    /// Ask whether to retry a failed LLM call. Returning false aborts the
    /// worker.
    fn retry_or_abort(&self, context: &str) -> bool;
}

/// Run a confirm prompt off the async runtime.
pub async fn confirm_blocking(operator: Arc<dyn Operator>, prompt: String) -> bool {
    tokio::task::spawn_blocking(move || operator.confirm(&prompt))
        .await
        .unwrap_or(false)
}

/// Run a retry prompt off the async runtime.
pub async fn retry_blocking(operator: Arc<dyn Operator>, context: String) -> bool {
    tokio::task::spawn_blocking(move || operator.retry_or_abort(&context))
        .await
        .unwrap_or(false)
}

/// Console operator reading stdin
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn confirm(&self, prompt: &str) -> bool {
        loop {
            print!("{} (y/N): ", prompt);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).is_err() {
                return false;
            }
            match line.trim().to_lowercase().as_str() {
                "y" => return true,
                "n" | "" => return false,
                _ => println!("Please choose one of the options"),
            }
        }
    }

    fn retry_or_abort(&self, context: &str) -> bool {
        println!("\n===== LLM INTERFACE ERROR =====");
        println!("{}", context);
        println!("===============================");
        println!("Press Enter to retry or Ctrl+C to exit...");
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => {
                println!("Retrying LLM request...");
                true
            }
        }
    }
}

/// Scripted operator for tests and non-interactive runs
pub struct ScriptedOperator {
    confirms: Mutex<VecDeque<bool>>,
    retries: Mutex<VecDeque<bool>>,
}

impl ScriptedOperator {
    pub fn new(confirms: Vec<bool>, retries: Vec<bool>) -> Self {
        Self {
            confirms: Mutex::new(confirms.into()),
            retries: Mutex::new(retries.into()),
        }
    }

    /// An operator that declines everything.
    pub fn declining() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&self, _prompt: &str) -> bool {
        self.confirms.lock().expect("operator lock poisoned").pop_front().unwrap_or(false)
    }

    fn retry_or_abort(&self, _context: &str) -> bool {
        self.retries.lock().expect("operator lock poisoned").pop_front().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_operator_plays_answers_in_order() {
        let operator = ScriptedOperator::new(vec![true, false], vec![true]);
        assert!(operator.confirm("?"));
        assert!(!operator.confirm("?"));
        assert!(!operator.confirm("?"), "exhausted script declines");
        assert!(operator.retry_or_abort("err"));
        assert!(!operator.retry_or_abort("err"));
    }
}
