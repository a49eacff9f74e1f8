//! Artifact commands

use eyre::{Result, bail};

use crate::commands::command::{Command, CommandArgs, SectionSpec, missing_required_sections};
use crate::commands::context::CommandContext;
use crate::research::artifact::Artifact;

pub struct AddArtifactCommand;

impl Command for AddArtifactCommand {
    fn name(&self) -> &'static str {
        "add_artifact"
    }

    fn help(&self) -> &'static str {
        "Add an artifact to the current problem. Artifacts are closed by default elsewhere and \
         show only the summary; use descriptive names that clearly indicate purpose."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("name", "Name of the artifact (descriptive, e.g. 'Market_Analysis_Summary')"),
            SectionSpec::required("content", "Content of the artifact"),
            SectionSpec::required("short_summary", "Short summary calling out what's important in this artifact"),
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let name = args.get("name").unwrap_or_default();
        let artifact = Artifact::new(
            name,
            args.get("content").unwrap_or_default(),
            args.get("short_summary").unwrap_or_default(),
        );
        ctx.current_node().add_artifact(artifact)?;
        ctx.add_command_output(self.name(), args, format!("Artifact '{}' added.", name));
        Ok(())
    }
}

pub struct AppendToArtifactCommand;

impl Command for AppendToArtifactCommand {
    fn name(&self) -> &'static str {
        "append_to_artifact"
    }

    fn help(&self) -> &'static str {
        "Append content to an existing artifact of the current problem"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("name", "Name of the artifact to append to"),
            SectionSpec::required("content", "Content to append"),
        ];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let name = args.get("name").unwrap_or_default();
        let content = args.get("content").unwrap_or_default().to_string();
        let found = ctx.current_node().modify_artifact(name, |artifact| {
            artifact.content.push_str("\n\n");
            artifact.content.push_str(&content);
        })?;
        if !found {
            bail!("Artifact '{}' not found", name);
        }
        ctx.add_command_output(
            self.name(),
            args,
            format!("Content successfully appended to artifact '{}'.", name),
        );
        Ok(())
    }
}

pub struct OverwriteArtifactCommand;

impl Command for OverwriteArtifactCommand {
    fn name(&self) -> &'static str {
        "overwrite_artifact"
    }

    fn help(&self) -> &'static str {
        "Overwrite an existing artifact's content and/or summary. At least one must be specified."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[
            SectionSpec::required("name", "Name of the artifact to overwrite"),
            SectionSpec::optional("content", "New content for the artifact"),
            SectionSpec::optional("short_summary", "New short summary for the artifact"),
        ];
        SECTIONS
    }

    fn validate(&self, args: &CommandArgs) -> Vec<String> {
        let mut errors = missing_required_sections(self.sections(), args);
        if !args.has("content") && !args.has("short_summary") {
            errors.push("Either content or short_summary must be provided".to_string());
        }
        errors
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let name = args.get("name").unwrap_or_default();
        let mut changes = Vec::new();
        let found = ctx.current_node().modify_artifact(name, |artifact| {
            if let Some(content) = args.get("content") {
                artifact.content = content.to_string();
                changes.push("content");
            }
            if let Some(summary) = args.get("short_summary") {
                artifact.short_summary = summary.to_string();
                changes.push("summary");
            }
        })?;
        if !found {
            bail!("Artifact '{}' not found", name);
        }
        ctx.add_command_output(
            self.name(),
            args,
            format!("Artifact '{}' updated with new {}.", name, changes.join(" and ")),
        );
        Ok(())
    }
}

pub struct DeleteArtifactCommand;

impl Command for DeleteArtifactCommand {
    fn name(&self) -> &'static str {
        "delete_artifact"
    }

    fn help(&self) -> &'static str {
        "Delete an existing artifact of the current problem"
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("name", "Name of the artifact to delete")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        let name = args.get("name").unwrap_or_default();
        if !ctx.current_node().remove_artifact(name)? {
            bail!("Artifact '{}' not found", name);
        }
        ctx.add_command_output(self.name(), args, format!("Artifact '{}' successfully deleted.", name));
        Ok(())
    }
}

pub struct OpenArtifactCommand;

impl Command for OpenArtifactCommand {
    fn name(&self) -> &'static str {
        "open_artifact"
    }

    fn help(&self) -> &'static str {
        "Open an artifact to view its full content. Artifacts auto-close after 5 message iterations."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("name", "Name of the artifact to open")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        set_visibility(ctx, self.name(), args, true)
    }
}

pub struct CloseArtifactCommand;

impl Command for CloseArtifactCommand {
    fn name(&self) -> &'static str {
        "close_artifact"
    }

    fn help(&self) -> &'static str {
        "Close an artifact manually; the short summary stays visible."
    }

    fn sections(&self) -> &'static [SectionSpec] {
        const SECTIONS: &[SectionSpec] = &[SectionSpec::required("name", "Name of the artifact to close")];
        SECTIONS
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()> {
        set_visibility(ctx, self.name(), args, false)
    }
}

/// Flip visibility on every artifact in the research matching the name,
/// recorded against the current node.
fn set_visibility(ctx: &CommandContext, command_name: &str, args: &CommandArgs, open: bool) -> Result<()> {
    let name = args.get("name").unwrap_or_default();
    let matches = ctx.search_artifacts(name);
    if matches.is_empty() {
        bail!("Artifact '{}' not found", name);
    }
    for (_, artifact) in &matches {
        ctx.current_node().set_artifact_visibility(&artifact.name, open)?;
    }
    let output = if open {
        format!("Artifact '{}' is now fully visible.", name)
    } else {
        format!("Artifact '{}' is now closed (showing only the summary).", name)
    };
    ctx.add_command_output(command_name, args, output);
    Ok(())
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
    fn test_add_duplicate_artifact_is_error() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let cmd = AddArtifactCommand;
        let a = args(&[("name", "A"), ("content", "c"), ("short_summary", "s")]);

        cmd.execute(&ctx, &a).unwrap();
        let err = cmd.execute(&ctx, &a).unwrap_err();
        assert!(err.to_string().contains("same name"));
    }

    #[test]
    fn test_append_and_overwrite() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        AddArtifactCommand
            .execute(&ctx, &args(&[("name", "A"), ("content", "base"), ("short_summary", "s")]))
            .unwrap();

        AppendToArtifactCommand
            .execute(&ctx, &args(&[("name", "A"), ("content", "more")]))
            .unwrap();
        assert_eq!(ctx.current_node().artifact_named("A").unwrap().content, "base\n\nmore");

        OverwriteArtifactCommand
            .execute(&ctx, &args(&[("name", "A"), ("short_summary", "new summary")]))
            .unwrap();
        let artifact = ctx.current_node().artifact_named("A").unwrap();
        assert_eq!(artifact.short_summary, "new summary");
        assert_eq!(artifact.content, "base\n\nmore");
    }

    #[test]
    fn test_overwrite_requires_some_change() {
        let errors = OverwriteArtifactCommand.validate(&args(&[("name", "A")]));
        assert!(errors.iter().any(|e| e.contains("Either content or short_summary")));
    }

    #[test]
    fn test_delete_missing_artifact_is_error() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        let err = DeleteArtifactCommand.execute(&ctx, &args(&[("name", "ghost")])).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_delete_removes_file() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        AddArtifactCommand
            .execute(&ctx, &args(&[("name", "A"), ("content", "c"), ("short_summary", "s")]))
            .unwrap();
        let path = ctx.current_node().artifact_named("A").unwrap().path.unwrap();
        assert!(path.exists());

        DeleteArtifactCommand.execute(&ctx, &args(&[("name", "A")])).unwrap();
        assert!(!path.exists());
        assert!(ctx.current_node().artifact_named("A").is_none());
    }

    #[test]
    fn test_open_close_visibility() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        AddArtifactCommand
            .execute(&ctx, &args(&[("name", "A"), ("content", "c"), ("short_summary", "s")]))
            .unwrap();

        CloseArtifactCommand.execute(&ctx, &args(&[("name", "A")])).unwrap();
        assert!(!ctx.current_node().artifact_visibility("A"));

        OpenArtifactCommand.execute(&ctx, &args(&[("name", "A")])).unwrap();
        assert!(ctx.current_node().artifact_visibility("A"));
    }

    #[test]
    fn test_open_unknown_artifact_is_error() {
        let temp = tempdir().unwrap();
        let ctx = context(&temp);
        assert!(OpenArtifactCommand.execute(&ctx, &args(&[("name", "ghost")])).is_err());
    }
}
