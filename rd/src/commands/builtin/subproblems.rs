//! Subproblem management commands

use eyre::{Result, bail};

use crate::commands::command::{Command, CommandArgs, SectionSpec};
use crate::commands::context::CommandContext;
use crate::research::state::ProblemStatus;

pub struct AddSubproblemCommand;

impl Command for AddSubproblemCommand {
    fn name(&self) -> &'static str {
        "add_subproblem"
    }

    fn help(&self) -> &'static str {
        "Create a child subproblem with a unique title. Adding an existing title is a no-op."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("title", "Title of the subproblem"),
            SectionSpec::required("content", "Content of the subproblem definition"),
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("title").unwrap_or_default();
        if ctx.current_node().child_by_title(title).is_some() {
            return Ok(());
        }
        ctx.current_node().create_child(title, args.get("content").unwrap_or_default())?;
        ctx.add_command_output(self.name(), args, format!("Subproblem '{}' added.", title));
        Ok(())
    }
}

pub struct ActivateSubproblemsCommand;

impl Command for ActivateSubproblemsCommand {
    fn name(&self) -> &'static str {
        "activate_subproblems"
    }

    fn help(&self) -> &'static str {
        "Activate subproblems to run in parallel. Multiple titles can be specified; \
         already-running subproblems are left as they are."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::multiple("title", "Title of the subproblem to activate")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let titles = args.get_all("title");
        if titles.is_empty() {
            bail!("No subproblems specified to activate");
        }

        for title in titles {
            if ctx.current_node().child_by_title(title).is_none() {
                bail!("Subproblem '{}' not found", title);
            }
        }
        for title in titles {
            if !ctx.activate_subtask(title) {
                bail!("Failed to activate subproblem '{}'", title);
            }
        }

        ctx.add_command_output(
            self.name(),
            args,
            format!("Activated subproblems for parallel execution: {}.", titles.join(", ")),
        );
        Ok(())
    }
}

pub struct WaitForSubproblemsCommand;

impl Command for WaitForSubproblemsCommand {
    fn name(&self) -> &'static str {
        "wait_for_subproblems"
    }

    fn help(&self) -> &'static str {
        "Pause the current problem until the named subproblems complete."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::multiple("title", "Title of the subproblem to wait for")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let titles = args.get_all("title");
        if titles.is_empty() {
            bail!("No subproblems specified to wait for");
        }

        let active_titles: Vec<String> = ctx
            .current_node()
            .children()
            .into_iter()
            .filter(|c| !c.status().is_terminal())
            .map(|c| c.title().to_string())
            .collect();
        for title in titles {
            if !active_titles.iter().any(|t| t == title) {
                bail!("Subproblem '{}' not found or not active", title);
            }
        }

        for title in titles {
            ctx.wait_for_subtask(title);
        }

        ctx.add_command_output(
            self.name(),
            args,
            format!("Waiting for subproblems to complete: {}.", titles.join(", ")),
        );
        Ok(())
    }
}

pub struct CancelSubproblemCommand;

impl Command for CancelSubproblemCommand {
    fn name(&self) -> &'static str {
        "cancel_subproblem"
    }

    fn help(&self) -> &'static str {
        "Mark a subproblem as cancelled, if you no longer want to run it."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("title", "Title of the subproblem to cancel")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("title").unwrap_or_default();
        let Some(child) = ctx.current_node().child_by_title(title) else {
            bail!("Subproblem '{}' not found", title);
        };
        if child.status().is_terminal() {
            bail!("Subproblem '{}' is already {}", title, child.status());
        }
        child.set_status(ProblemStatus::Cancelled);
        ctx.add_command_output(self.name(), args, format!("Subproblem '{}' cancelled.", title));
        Ok(())
    }
}
