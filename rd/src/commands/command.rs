//! Command trait, arguments, and registry

use std::collections::BTreeMap;

use eyre::Result;

use super::context::CommandContext;

/// Declaration of one `///section` a command accepts
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub name: &'static str,
    pub required: bool,
    pub help: &'static str,
    pub allow_multiple: bool,
}

impl SectionSpec {
    pub const fn required(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            required: true,
            help,
            allow_multiple: false,
        }
    }

    pub const fn optional(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            required: false,
            help,
            allow_multiple: false,
        }
    }

    pub const fn multiple(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            required: true,
            help,
            allow_multiple: true,
        }
    }
}

/// Parsed section values for one command invocation
#[derive(Debug, Clone, Default)]
pub struct CommandArgs {
    values: BTreeMap<String, Vec<String>>,
    numbers: BTreeMap<String, usize>,
}

impl CommandArgs {
    pub fn push(&mut self, name: &str, value: String) {
        self.values.entry(name.to_string()).or_default().push(value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Store a numeric value produced by `transform_args`.
    pub fn set_number(&mut self, name: &str, value: usize) {
        self.numbers.insert(name.to_string(), value);
    }

    pub fn number(&self, name: &str) -> Option<usize> {
        self.numbers.get(name).copied()
    }

    /// Echo form used in command outputs.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| {
                let value = if v.len() == 1 {
                    serde_json::Value::String(v[0].clone())
                } else {
                    serde_json::Value::Array(v.iter().cloned().map(serde_json::Value::String).collect())
                };
                (k.clone(), value)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// A command the LLM can issue. Pure mutation of the context; anything the
/// model should see back goes through `ctx.add_command_output`, and an
/// `Err` is reported as `failed: <reason>` in the next auto-reply.
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn help(&self) -> &'static str;

    fn sections(&self) -> &'static [SectionSpec];

    /// Rewrite arguments before validation (e.g. 1-based to 0-based
    /// indices). A failure aborts this command with an error.
    fn transform_args(&self, _args: &mut CommandArgs) -> Result<(), String> {
        Ok(())
    }

    /// Semantic validation; returns error messages to report.
    fn validate(&self, args: &CommandArgs) -> Vec<String> {
        missing_required_sections(self.sections(), args)
    }

    /// True when no further commands may execute after this one.
    fn is_last_in_message(&self) -> bool {
        false
    }

    fn execute(&self, ctx: &CommandContext, args: &CommandArgs) -> Result<()>;
}

/// The default required-section check, reusable by commands that extend
/// `validate`.
pub fn missing_required_sections(sections: &[SectionSpec], args: &CommandArgs) -> Vec<String> {
    sections
        .iter()
        .filter(|s| s.required && !args.has(s.name))
        .map(|s| format!("Missing required section '{}'", s.name))
        .collect()
}

/// Registry of all available commands
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// Registry with the full built-in command set.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for command in super::builtin::all_commands() {
            registry.register(command);
        }
        registry
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        if self.commands.contains_key(command.name()) {
            tracing::warn!(name = command.name(), "command re-registered");
        }
        self.commands.insert(command.name(), command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|command| command.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.keys().copied().collect()
    }

    /// Iterate commands in name order, for help generation.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.values().map(|command| command.as_ref())
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
