//! Shared knowledge base commands

use eyre::{Result, bail};

use crate::commands::command::{Command, CommandArgs, SectionSpec};
use crate::commands::context::CommandContext;
use crate::research::knowledge::KnowledgeEntry;

pub struct AddKnowledgeCommand;

impl Command for AddKnowledgeCommand {
    fn name(&self) -> &'static str {
        "add_knowledge"
    }

    fn help(&self) -> &'static str {
        "Add an entry to the shared knowledge base. Titles are unique across all entries."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("title", "Title for the entry (unique across all knowledge entries)"),
            SectionSpec::required("content", "The main content of the knowledge entry"),
            SectionSpec {
                name: "tag",
                required: false,
                help: "Optional tag for categorization (can be used multiple times)",
                allow_multiple: true,
            },
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("title").unwrap_or_default();
        let entry = KnowledgeEntry::new(
            title,
            args.get("content").unwrap_or_default(),
            ctx.current_node().title(),
        )
        .with_tags(args.get_all("tag").to_vec());

        ctx.knowledge_base().add_entry(entry)?;
        ctx.add_command_output(self.name(), args, format!("Knowledge entry '{}' added successfully.", title));
        Ok(())
    }
}

pub struct AppendKnowledgeCommand;

impl Command for AppendKnowledgeCommand {
    fn name(&self) -> &'static str {
        "append_knowledge"
    }

    fn help(&self) -> &'static str {
        "Append content to an existing knowledge entry."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("title", "Title of the knowledge entry to append to"),
            SectionSpec::required("content", "Content to append to the existing entry"),
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("title").unwrap_or_default();
        if !ctx.knowledge_base().append_content(title, args.get("content").unwrap_or_default())? {
            bail!("Knowledge entry with title '{}' not found", title);
        }
        ctx.add_command_output(
            self.name(),
            args,
            format!("Content appended to knowledge entry '{}' successfully.", title),
        );
        Ok(())
    }
}

pub struct RewriteKnowledgeCommand;

impl Command for RewriteKnowledgeCommand {
    fn name(&self) -> &'static str {
        "rewrite_knowledge"
    }

    fn help(&self) -> &'static str {
        "Rewrite the content of an existing knowledge entry, optionally renaming it."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("title", "Title of the knowledge entry to rewrite"),
            SectionSpec::required("content", "New content replacing the existing content"),
            SectionSpec::optional("new_title", "Optional new title for the entry"),
            SectionSpec {
                name: "tag",
                required: false,
                help: "Optional new tags (replaces all existing tags if specified)",
                allow_multiple: true,
            },
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("title").unwrap_or_default();
        let new_title = args.get("new_title");
        let new_tags = if args.has("tag") { Some(args.get_all("tag").to_vec()) } else { None };

        let updated =
            ctx.knowledge_base()
                .update_entry(title, args.get("content").unwrap_or_default(), new_title, new_tags)?;
        if !updated {
            bail!("Knowledge entry with title '{}' not found", title);
        }

        let title_msg = new_title.map(|t| format!(" and title updated to '{}'", t)).unwrap_or_default();
        ctx.add_command_output(
            self.name(),
            args,
            format!("Knowledge entry '{}' content rewritten{} successfully.", title, title_msg),
        );
        Ok(())
    }
}

pub struct DeleteKnowledgeCommand;

impl Command for DeleteKnowledgeCommand {
    fn name(&self) -> &'static str {
        "delete_knowledge"
    }

    fn help(&self) -> &'static str {
        "Delete an existing knowledge entry."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("title", "Title of the knowledge entry to delete")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let title = args.get("title").unwrap_or_default();
        if !ctx.knowledge_base().delete_entry(title) {
            bail!("Knowledge entry with title '{}' not found", title);
        }
        ctx.add_command_output(self.name(), args, format!("Knowledge entry '{}' deleted successfully.", title));
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

    fn args(pairs: &[(&str, &str)]) -> CommandArgs {
        let mut args = CommandArgs::default();
        for (k, v) in pairs {
            args.push(k, v.to_string());
        }
        args
    }

    #[test]
    fn test_add_records_author_and_tags() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let mut a = args(&[("title", "K"), ("content", "body")]);
        a.push("tag", "econ".to_string());
        a.push("tag", "q3".to_string());

        AddKnowledgeCommand.execute(&ctx, &a).unwrap();

        let entry = ctx.knowledge_base().get_entry("K").unwrap();
        assert_eq!(entry.author_node_title, "t");
        assert_eq!(entry.tags, vec!["econ".to_string(), "q3".to_string()]);
    }

    #[test]
    fn test_duplicate_add_is_error() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let a = args(&[("title", "K"), ("content", "body")]);

        AddKnowledgeCommand.execute(&ctx, &a).unwrap();
        let err = AddKnowledgeCommand.execute(&ctx, &a).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_append_missing_entry_is_error() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let err = AppendKnowledgeCommand
            .execute(&ctx, &args(&[("title", "ghost"), ("content", "x")]))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_rewrite_with_rename() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        AddKnowledgeCommand
            .execute(&ctx, &args(&[("title", "K"), ("content", "v1")]))
            .unwrap();

        RewriteKnowledgeCommand
            .execute(&ctx, &args(&[("title", "K"), ("content", "v2"), ("new_title", "K2")]))
            .unwrap();

        assert!(ctx.knowledge_base().get_entry("K").is_none());
        assert_eq!(ctx.knowledge_base().get_entry("K2").unwrap().content, "v2");
    }

    #[test]
    fn test_delete_round_trip() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        AddKnowledgeCommand
            .execute(&ctx, &args(&[("title", "K"), ("content", "v1")]))
            .unwrap();

        DeleteKnowledgeCommand.execute(&ctx, &args(&[("title", "K")])).unwrap();
        assert!(
            DeleteKnowledgeCommand
                .execute(&ctx, &args(&[("title", "K")]))
                .is_err()
        );
    }
}
