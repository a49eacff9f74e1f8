//! Terminal-status commands

use eyre::{Result, bail};

use crate::commands::command::{Command, CommandArgs, SectionSpec};
use crate::commands::context::CommandContext;
use crate::research::state::ProblemStatus;

fn reject_if_children_running(ctx: &CommandContext, action: &str) -> Result<()> {
    for child in ctx.current_node().children() {
        if child.status() == ProblemStatus::InProgress {
            bail!(
                "Failed to {} the problem as there are running subtasks, cancel or wait for them.",
                action
            );
        }
    }
    Ok(())
}

pub struct FinishProblemCommand;

impl Command for FinishProblemCommand {
    fn name(&self) -> &'static str {
        "finish_problem"
    }

    fn help(&self) -> &'static str {
        "Finish the current problem. An optional ///message is passed to the parent task \
         (or stored as the final resolution on the root). Rejected while subproblems are running."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] =
            &[SectionSpec::optional("message", "Optional message to pass to the parent task upon completion")];
        SECTIONS
    }

    fn is_last_in_message(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        reject_if_children_running(ctx, "finish")?;
        ctx.finish_node(args.get("message"));
        Ok(())
    }
}

pub struct FailProblemCommand;

impl Command for FailProblemCommand {
    fn name(&self) -> &'static str {
        "fail_problem"
    }

    fn help(&self) -> &'static str {
        "Mark the current problem as FAILED. An optional ///message explains the failure to the \
         parent task. Rejected while subproblems are running."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] =
            &[SectionSpec::optional("message", "Optional message explaining the failure")];
        SECTIONS
    }

    fn is_last_in_message(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        reject_if_children_running(ctx, "fail")?;
        ctx.fail_node(args.get("message"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::Research;
    use tempfile::tempdir;

    fn context(temp: &tempfile::TempDir) -> CommandContext {
        let research = Research::create(temp.path(), "t").unwrap();
        let root = research.define_root_problem("root").unwrap();
        CommandContext::new(root, research)
    }

    #[test]
    fn test_finish_rejected_with_running_child() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let child = ctx.current_node().create_child("C", "c").unwrap();
        child.set_status(ProblemStatus::InProgress);

        let err = FinishProblemCommand.execute(&ctx, &CommandArgs::default()).unwrap_err();
        assert!(err.to_string().contains("running subtasks"));
        assert_ne!(ctx.current_node().status(), ProblemStatus::Finished);
    }

    #[test]
    fn test_finish_root_with_message() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let mut args = CommandArgs::default();
        args.push("message", "final answer".to_string());

        FinishProblemCommand.execute(&ctx, &args).unwrap();
        assert_eq!(ctx.current_node().status(), ProblemStatus::Finished);
        assert_eq!(ctx.current_node().resolution_message().as_deref(), Some("final answer"));
    }

    #[test]
    fn test_fail_mirrors_finish() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);

        FailProblemCommand.execute(&ctx, &CommandArgs::default()).unwrap();
        assert_eq!(ctx.current_node().status(), ProblemStatus::Failed);
    }

    #[test]
    fn test_terminal_commands_are_last_in_message() {
        assert!(FinishProblemCommand.is_last_in_message());
        assert!(FailProblemCommand.is_last_in_message());
    }
}
