//! Command system: grammar, registry, built-ins, dispatcher

pub mod builtin;
pub mod command;
pub mod context;
pub mod parser;
pub mod processor;

pub use command::{Command, CommandArgs, CommandRegistry, SectionSpec};
pub use context::CommandContext;
pub use parser::{ParseError, ParsedCommand, generate_error_report, parse_text};
pub use processor::{CommandProcessor, EngineSignal, SHUTDOWN_SENTINEL};
