//! Logging, messaging, and scratchpad commands

use eyre::{Result, bail};

use crate::commands::command::{Command, CommandArgs, SectionSpec};
use crate::commands::context::CommandContext;

pub struct AppendToProblemDefinitionCommand;

impl Command for AppendToProblemDefinitionCommand {
    fn name(&self) -> &'static str {
        "append_to_problem_definition"
    }

    fn help(&self) -> &'static str {
        "Append content to the current problem definition"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("content", "Content to append")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        ctx.current_node().append_to_problem_definition(args.get("content").unwrap_or_default())?;
        ctx.add_command_output(self.name(), args, "Problem definition updated.");
        Ok(())
    }
}

pub struct AddLogEntryCommand;

impl Command for AddLogEntryCommand {
    fn name(&self) -> &'static str {
        "add_log_entry"
    }

    fn help(&self) -> &'static str {
        "Add an entry to the research-level permanent log"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("content", "Content of the log entry")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let content = args.get("content").unwrap_or_default();
        if !content.is_empty() {
            ctx.add_to_permanent_log(content);
            ctx.add_command_output(self.name(), args, "Log entry added.");
        }
        Ok(())
    }
}

pub struct SendMessageToCommand;

impl Command for SendMessageToCommand {
    fn name(&self) -> &'static str {
        "send_message_to"
    }

    fn help(&self) -> &'static str {
        "Send a message to the teammate assigned to one of your subproblems. \
         Does not change any status; use activate_subproblems afterwards if needed."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("subproblem_title", "Title of the subproblem"),
            SectionSpec::required("message", "Content of the message"),
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("subproblem_title").unwrap_or_default();
        let Some(child) = ctx.current_node().child_by_title(title) else {
            bail!("Subproblem '{}' wasn't found, message not sent", title);
        };
        child
            .history()
            .aggregator_mut()
            .add_internal_message_from(args.get("message").unwrap_or_default(), ctx.current_node().title());
        ctx.add_command_output(self.name(), args, "Message successfully sent.");
        Ok(())
    }
}

pub struct ThinkCommand;

impl Command for ThinkCommand {
    fn name(&self) -> &'static str {
        "think"
    }

    fn help(&self) -> &'static str {
        "A place for you to think before taking actions"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::optional("content", "Thinking content, as long as needed")];
        SECTIONS
    }

    fn execute(&self, _ctx: &CommandContext, _args: &CommandArgs) -> Result<()> {
        Ok(())
    }
}
