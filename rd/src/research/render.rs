//! Rendering history blocks into LLM messages
//!
//! Blocks are processed newest-to-oldest so that every auto-reply knows how
//! many times each dynamic section changes after it (sections with newer
//! versions render redacted), and so older command outputs shrink under a
//! halving character budget.

use std::collections::HashMap;

use crate::llm::HistoryMessage;

use super::history::{AutoReply, HistoryBlock, SectionSlot};

/// Per-command output budget applied from the fourth-newest auto-reply on
const ITERATIVE_AUTO_REPLY_MAX_LENGTH: usize = 5000;

/// Floor the halving budget never goes below
const AUTO_REPLY_TRUNCATION_FLOOR: usize = 300;

/// Auto-replies this recent render their command outputs in full
const UNTRUNCATED_AUTO_REPLIES: usize = 3;

/// Render the whole history into chronological `(author, content)` messages
/// for the LLM request.
pub fn history_messages(blocks: &[HistoryBlock]) -> Vec<HistoryMessage> {
    let mut messages = Vec::with_capacity(blocks.len());
    let mut auto_reply_counter = 0usize;
    let mut shrinking_budget = ITERATIVE_AUTO_REPLY_MAX_LENGTH;

    for (index, block) in blocks.iter().enumerate().rev() {
        match block {
            HistoryBlock::ChatMessage { author, content } => {
                messages.push(HistoryMessage::new(author.clone(), content.clone()));
            }
            HistoryBlock::InitialInterface {
                static_content,
                dynamic_sections,
            } => {
                let future_changes = future_changes_after(blocks, index);
                messages.push(HistoryMessage::new(
                    "user",
                    render_initial_interface(static_content, dynamic_sections, &future_changes),
                ));
            }
            HistoryBlock::AutoReply(reply) => {
                auto_reply_counter += 1;
                let max_len = if auto_reply_counter > UNTRUNCATED_AUTO_REPLIES {
                    let current = shrinking_budget;
                    shrinking_budget = (shrinking_budget / 2).max(AUTO_REPLY_TRUNCATION_FLOOR);
                    Some(current)
                } else {
                    None
                };
                let future_changes = future_changes_after(blocks, index);
                messages.push(HistoryMessage::new(
                    "user",
                    render_auto_reply(reply, &future_changes, max_len),
                ));
            }
        }
    }

    messages.reverse();
    messages
}

/// Count, per section index, how many newer blocks carry a fresher version
/// of that section.
fn future_changes_after(blocks: &[HistoryBlock], index: usize) -> HashMap<usize, usize> {
    let mut map: HashMap<usize, usize> = HashMap::new();
    for block in &blocks[index + 1..] {
        let sections = match block {
            HistoryBlock::AutoReply(reply) => &reply.dynamic_sections,
            HistoryBlock::InitialInterface { dynamic_sections, .. } => dynamic_sections,
            HistoryBlock::ChatMessage { .. } => continue,
        };
        for slot in sections {
            *map.entry(slot.index).or_default() += 1;
        }
    }
    map
}

/// Render the initial interface block: static preamble plus every section.
pub fn render_initial_interface(
    static_content: &str,
    sections: &[SectionSlot],
    future_changes: &HashMap<usize, usize>,
) -> String {
    let mut pieces = vec![static_content.to_string()];
    for slot in sections {
        let changes = future_changes.get(&slot.index).copied().unwrap_or(0);
        pieces.push(slot.data.render(changes));
    }
    pieces.join("\n\n")
}

/// Render an auto-reply block for the LLM.
pub fn render_auto_reply(
    reply: &AutoReply,
    future_changes: &HashMap<usize, usize>,
    per_command_max: Option<usize>,
) -> String {
    let mut out = String::from("# Automatic Reply\n");

    if let Some(confirmation) = &reply.confirmation_request {
        out.push_str(&format!("\n## Confirmation Required\n{}\n", confirmation));
    }

    if !reply.error_report.is_empty() {
        out.push_str(&format!("\n{}\n", reply.error_report));
    }

    if !reply.command_outputs.is_empty() {
        out.push_str("\n## Command Outputs\n");
        for output in &reply.command_outputs {
            let body = match per_command_max {
                Some(max) => truncate_at_line(&output.output, max),
                None => output.output.clone(),
            };
            out.push_str(&format!("### {}\n{}\n", output.name, body));
        }
    }

    if !reply.messages.is_empty() {
        out.push_str("\n## Messages\n");
        for message in &reply.messages {
            out.push_str(&format!("### From: {}\n{}\n", message.source, message.content));
        }
    }

    if !reply.dynamic_sections.is_empty() {
        out.push_str("\n## Updated Sections\n");
        for slot in &reply.dynamic_sections {
            let changes = future_changes.get(&slot.index).copied().unwrap_or(0);
            out.push_str(&format!("\n{}\n", slot.data.render(changes)));
        }
    }

    out
}

/// Truncate at the last line break before `max_len`, noting how much was
/// omitted.
pub fn truncate_at_line(content: &str, max_len: usize) -> String {
    if content.len() <= max_len {
        return content.to_string();
    }

    let boundary = floor_char_boundary(content, max_len);
    let cut = match content[..boundary].rfind('\n') {
        Some(pos) if pos > 0 => pos,
        _ => boundary,
    };
    let truncated = &content[..cut];
    let omitted = content.len() - truncated.len();
    let percent = (omitted as f64 / content.len() as f64) * 100.0;
    format!(
        "{}\n\n[...{} characters omitted ({:.1}% of content)]",
        truncated, omitted, percent
    )
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
