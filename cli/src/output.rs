use coda_core::{AskResponseBatch, AskResponseStatus};
use colored::*;
use std::io::{self, Write};

/// Writes the response batch to stdout in the requested format.
pub fn write_response<W: Write>(
    out: &mut W,
    response: &AskResponseBatch,
    json: bool,
) -> io::Result<()> {
    if json {
        let line = serde_json::to_string(response)?;
        writeln!(out, "{line}")?;
    } else {
        for line in render_text(response) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()
}

/// Human-readable lines: one per answer, then the note, then the status
/// when it carries information the answers do not.
pub fn render_text(response: &AskResponseBatch) -> Vec<String> {
    let mut lines: Vec<String> = response
        .answers
        .iter()
        .map(|answer| match (answer.used_other, answer.other_text.as_deref()) {
            (true, Some(text)) => format!("{}: {} ({})", answer.id, answer.selected_label, text),
            _ => format!("{}: {}", answer.id, answer.selected_label),
        })
        .collect();

    if let Some(note) = &response.note {
        lines.push(format!("note: {note}"));
    }

    if response.status != AskResponseStatus::Answered || response.answers.is_empty() {
        lines.push(format!("status: {}", response.status));
    }

    lines
}

/// Prints a single `error: <message>` line on stderr.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}
