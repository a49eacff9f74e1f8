//! Criteria commands

use eyre::{Result, bail};

use crate::commands::command::{Command, CommandArgs, SectionSpec};
use crate::commands::context::CommandContext;

pub struct AddCriteriaCommand;

impl Command for AddCriteriaCommand {
    fn name(&self) -> &'static str {
        "add_criteria"
    }

    fn help(&self) -> &'static str {
        "Add a definition-of-done criterion to the current problem"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("criteria", "Criteria text")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let text = args.get("criteria").unwrap_or_default();
        let existing: Vec<String> = ctx.current_node().criteria().iter().map(|c| c.content.clone()).collect();
        if existing.iter().any(|c| c == text) {
            return Ok(());
        }
        ctx.current_node().add_criterion(text)?;
        ctx.add_command_output(self.name(), args, format!("Criteria '{}' added.", text));
        Ok(())
    }
}

pub struct MarkCriteriaAsDoneCommand;

impl Command for MarkCriteriaAsDoneCommand {
    fn name(&self) -> &'static str {
        "mark_criteria_as_done"
    }

    fn help(&self) -> &'static str {
        "Mark a criterion as completed by its 1-based number"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] =
            &[SectionSpec::required("criteria_number", "Number of the criteria to mark as done")];
        SECTIONS
    }

    fn transform_args(&self, args: &mut CommandArgs) -> Result<(), String> {
        if let Some(raw) = args.get("criteria_number") {
            let number: usize = raw
                .trim()
                .parse()
                .map_err(|_| format!("Invalid criteria index: '{}', must be a number", raw))?;
            if number < 1 {
                return Err(format!("Criteria index must be positive, got: {}", number));
            }
            args.set_number("index", number - 1);
        }
        Ok(())
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let Some(index) = args.number("index") else {
            bail!("Invalid criteria index");
        };
        if !ctx.current_node().mark_criterion_done(index)? {
            bail!("Criteria {} not found", index + 1);
        }
        ctx.add_command_output(self.name(), args, format!("Criteria {} marked as done.", index + 1));
        Ok(())
    }
}

pub struct AddCriteriaToSubproblemCommand;

impl Command for AddCriteriaToSubproblemCommand {
    fn name(&self) -> &'static str {
        "add_criteria_to_subproblem"
    }

    fn help(&self) -> &'static str {
        "Add a definition-of-done criterion to a named subproblem"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("title", "Title of the subproblem"),
            SectionSpec::required("criteria", "Criteria text"),
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("title").unwrap_or_default();
        let text = args.get("criteria").unwrap_or_default();

        let Some(child) = ctx.current_node().child_by_title(title) else {
            bail!("Subproblem '{}' not found", title);
        };
        if child.criteria().iter().any(|c| c.content == text) {
            return Ok(());
        }
        child.add_criterion(text)?;
        ctx.add_command_output(self.name(), args, format!("Criteria added to subproblem '{}'.", title));
        Ok(())
    }
}
