//! Command block parser
//!
//! Line-oriented grammar: a block opens with `<<< name`, closes with `>>>`,
//! and contains `///section` bodies. Blocks never nest. All errors across a
//! message are collected and reported together, sorted by line number and
//! partitioned into syntax vs other errors.

use std::collections::BTreeMap;

use tracing::debug;

use super::command::{Command, CommandArgs, CommandRegistry};

/// An error found while parsing or validating one command block
#[derive(Debug, Clone)]
pub struct ParseError {
    pub command_name: Option<String>,
    pub message: String,
    pub line_number: Option<usize>,
    pub is_syntax_error: bool,
}

/// Result of parsing a single command block (or a dangling-tag error)
#[derive(Debug, Default)]
pub struct ParsedCommand {
    pub command_name: Option<String>,
    pub args: CommandArgs,
    pub errors: Vec<ParseError>,
    pub block_start_line: Option<usize>,
}

impl ParsedCommand {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parse every command block out of an LLM message.
pub fn parse_text(registry: &CommandRegistry, text: &str) -> Vec<ParsedCommand> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut results: Vec<ParsedCommand> = Vec::new();
    let mut blocks: Vec<(usize, usize)> = Vec::new();

    let mut open_tag_index: Option<usize> = None;
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if opening_command_name(stripped).is_some() {
            if open_tag_index.is_some() {
                results.push(syntax_error_result(
                    "Found opening tag '<<<' before the previous one was closed with '>>>'.",
                    i + 1,
                ));
            }
            open_tag_index = Some(i);
        } else if stripped == ">>>" {
            match open_tag_index.take() {
                Some(start) => blocks.push((start, i)),
                None => results.push(syntax_error_result(
                    "Found closing tag '>>>' without a matching opening tag '<<<'.",
                    i + 1,
                )),
            }
        }
    }
    if let Some(start) = open_tag_index {
        results.push(syntax_error_result(
            "Command block starting on this line was never closed with '>>>'.",
            start + 1,
        ));
    }

    for (start, end) in blocks {
        results.push(parse_block(registry, &lines, start, end));
    }

    results.sort_by_key(|r| r.block_start_line.unwrap_or(0));
    debug!(blocks = results.len(), "parsed command blocks");
    results
}

/// Extract the command name from an opening line, if it is one.
fn opening_command_name(stripped_line: &str) -> Option<&str> {
    let rest = stripped_line.strip_prefix("<<<")?.trim_start();
    let name_len = rest.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').count();
    if name_len == 0 {
        return None;
    }
    Some(&rest[..name_len])
}

fn syntax_error_result(message: &str, line_number: usize) -> ParsedCommand {
    ParsedCommand {
        errors: vec![ParseError {
            command_name: None,
            message: message.to_string(),
            line_number: Some(line_number),
            is_syntax_error: true,
        }],
        block_start_line: Some(line_number),
        ..ParsedCommand::default()
    }
}

fn parse_block(registry: &CommandRegistry, lines: &[&str], start: usize, end: usize) -> ParsedCommand {
    let mut result = ParsedCommand {
        block_start_line: Some(start + 1),
        ..ParsedCommand::default()
    };

    let Some(name) = opening_command_name(lines[start].trim()) else {
        result.errors.push(ParseError {
            command_name: None,
            message: "Invalid block opening line format.".to_string(),
            line_number: Some(start + 1),
            is_syntax_error: true,
        });
        return result;
    };
    result.command_name = Some(name.to_string());

    let Some(command) = registry.get(name) else {
        result.errors.push(ParseError {
            command_name: Some(name.to_string()),
            message: format!("Unknown command: '{}'", name),
            line_number: Some(start + 1),
            is_syntax_error: false,
        });
        return result;
    };

    let (args, mut section_errors) = parse_sections(command, lines, start + 1, end);
    result.errors.append(&mut section_errors);
    result.args = args;

    if let Err(message) = command.transform_args(&mut result.args) {
        result.errors.push(ParseError {
            command_name: Some(name.to_string()),
            message: format!("Error during argument transformation: {}", message),
            line_number: Some(start + 1),
            is_syntax_error: false,
        });
        return result;
    }

    for message in command.validate(&result.args) {
        result.errors.push(ParseError {
            command_name: Some(name.to_string()),
            message,
            line_number: Some(start + 1),
            is_syntax_error: false,
        });
    }

    result
}

/// Split block content into `///section` bodies according to the command's
/// declared sections.
fn parse_sections(
    command: &dyn Command,
    lines: &[&str],
    content_start: usize,
    content_end: usize,
) -> (CommandArgs, Vec<ParseError>) {
    let mut errors = Vec::new();
    // section name -> [(content, line_number)]
    let mut found: BTreeMap<String, Vec<(String, usize)>> = BTreeMap::new();

    let mut current: Option<(String, usize, Vec<&str>)> = None;
    let mut pre_text: Vec<&str> = Vec::new();

    for (i, &line) in lines.iter().enumerate().take(content_end).skip(content_start) {
        if let Some(section_name) = section_marker(line) {
            if let Some((name, line_no, body)) = current.take() {
                record_section(command, &mut found, &mut errors, name, line_no, &body);
            }
            let inline_rest = inline_section_content(line);
            current = Some((section_name.to_string(), i + 1, inline_rest));
        } else if let Some((_, _, body)) = current.as_mut() {
            body.push(line);
        } else {
            pre_text.push(line);
        }
    }
    if let Some((name, line_no, body)) = current.take() {
        record_section(command, &mut found, &mut errors, name, line_no, &body);
    }

    let pre_text_joined = pre_text.join("\n");
    let pre_text_trimmed = pre_text_joined.trim();
    if !pre_text_trimmed.is_empty() {
        let sections = command.sections();
        if found.is_empty() && sections.len() == 1 {
            // A single-section command may omit the marker entirely
            found.insert(
                sections[0].name.to_string(),
                vec![(pre_text_trimmed.to_string(), content_start + 1)],
            );
        } else if found.is_empty() {
            errors.push(ParseError {
                command_name: Some(command.name().to_string()),
                message: "Content found after the last '///section' marker.".to_string(),
                line_number: Some(content_start + 1),
                is_syntax_error: false,
            });
        } else {
            errors.push(ParseError {
                command_name: Some(command.name().to_string()),
                message: "Content found before the first '///section' marker.".to_string(),
                line_number: Some(content_start + 1),
                is_syntax_error: false,
            });
        }
    }

    let mut args = CommandArgs::default();
    let allow_multiple: BTreeMap<&str, bool> =
        command.sections().iter().map(|s| (s.name, s.allow_multiple)).collect();
    for (name, occurrences) in found {
        let allows_multiple = allow_multiple.get(name.as_str()).copied().unwrap_or(false);
        if allows_multiple {
            for (content, _) in occurrences {
                args.push(&name, content);
            }
        } else {
            if occurrences.len() > 1 {
                for (_, line_no) in &occurrences[1..] {
                    errors.push(ParseError {
                        command_name: Some(command.name().to_string()),
                        message: format!(
                            "Multiple instances of section '///{}' found, but only one is allowed.",
                            name
                        ),
                        line_number: Some(*line_no),
                        is_syntax_error: false,
                    });
                }
            }
            args.push(&name, occurrences[0].0.clone());
        }
    }

    (args, errors)
}

fn record_section(
    command: &dyn Command,
    found: &mut BTreeMap<String, Vec<(String, usize)>>,
    errors: &mut Vec<ParseError>,
    name: String,
    line_number: usize,
    body: &[&str],
) {
    if !command.sections().iter().any(|s| s.name == name) {
        errors.push(ParseError {
            command_name: Some(command.name().to_string()),
            message: format!("Unknown section '///{}' for command '{}'.", name, command.name()),
            line_number: Some(line_number),
            is_syntax_error: false,
        });
        return;
    }
    let content = body.join("\n").trim().to_string();
    if content.is_empty() {
        errors.push(ParseError {
            command_name: Some(command.name().to_string()),
            message: format!("Section '///{}' cannot be empty.", name),
            line_number: Some(line_number),
            is_syntax_error: false,
        });
        return;
    }
    found.entry(name).or_default().push((content, line_number));
}

/// Detect a `///name` marker line and return the section name.
fn section_marker(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("///")?;
    let name_len = rest.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').count();
    if name_len == 0 {
        return None;
    }
    Some(&rest[..name_len])
}

/// Content on the marker line itself, after the section name.
fn inline_section_content(line: &str) -> Vec<&str> {
    let rest = line.trim_start().trim_start_matches("///");
    let name_len = rest.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').count();
    let after = rest[name_len..].trim();
    if after.is_empty() { Vec::new() } else { vec![after] }
}

/// Render the collected errors as the report returned to the LLM. Empty
/// when nothing failed.
pub fn generate_error_report(results: &[ParsedCommand]) -> String {
    let mut all_errors: Vec<&ParseError> = results.iter().flat_map(|r| r.errors.iter()).collect();
    if all_errors.is_empty() {
        return String::new();
    }
    all_errors.sort_by(|a, b| {
        let line_a = a.line_number.map(|n| n as i64).unwrap_or(-1);
        let line_b = b.line_number.map(|n| n as i64).unwrap_or(-1);
        line_a.cmp(&line_b).then_with(|| a.message.cmp(&b.message))
    });

    let mut parts = vec!["### Command Parsing Errors Report:".to_string()];
    let mut syntax_errors_found = false;
    let mut other_errors_found = false;

    for (i, error) in all_errors.iter().enumerate() {
        let line_info = error.line_number.map(|n| format!(" (near line {})", n)).unwrap_or_default();
        let cmd_info = error
            .command_name
            .as_ref()
            .map(|n| format!(" in command '{}'", n))
            .unwrap_or_default();
        let error_type = if error.is_syntax_error {
            syntax_errors_found = true;
            "Syntax Error"
        } else {
            other_errors_found = true;
            "Error"
        };
        parts.push(format!("#### {} {}{}{}:", error_type, i + 1, line_info, cmd_info));
        parts.push(format!("- {}", error.message));
    }

    parts.push("---".to_string());
    if syntax_errors_found {
        parts.push(
            "**Note:** Commands with block syntax errors (<<< \\n>>> issues) were not parsed or executed."
                .to_string(),
        );
    }
    if other_errors_found {
        parts.push(
            "**Note:** Commands with other errors (e.g., unknown command, missing/invalid sections) might be skipped during execution."
                .to_string(),
        );
    }

    parts.join("\n")
}
