//! Markdown checkbox parser for the task list.
//!
//! Parsing happens in two passes: [`split_lines`] turns the raw text into
//! logical lines regardless of line-ending convention, then each line is
//! matched against a single anchored pattern. Lines that do not match are
//! ignored; the parser never fails.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::task::{Task, TaskStatus};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Optional `[-*]` bullet (whitespace allowed only after it), one-character
/// checkbox, at least one whitespace, then the description. Indented lines
/// never match.
static TASK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*]\s*)?\[([ xX~!])\]\s+(.+)$").expect("task line pattern should compile")
});

/// Split text into logical lines on CRLF, LF, and bare CR (in any mixture).
///
/// A trailing line ending yields a final empty line, so line numbers match
/// what an editor shows. No returned line contains `\r` or `\n`.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&text[start..i]);
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    lines.push(&text[start..]);
    lines
}

/// Parse a single normalized line into `(status, description)`.
pub fn parse_task_line(line: &str) -> Option<(TaskStatus, &str)> {
    let caps = TASK_LINE_RE.captures(line)?;
    let marker = caps.get(1)?.as_str().chars().next()?;
    let status = TaskStatus::from_marker(marker)?;
    let description = caps.get(2)?.as_str().trim();
    if description.is_empty() {
        return None;
    }
    Some((status, description))
}

/// Parse task-list text into tasks, in document order.
///
/// A leading byte-order mark is dropped before splitting.
pub fn parse_tasks(text: &str) -> impl Iterator<Item = Task> + '_ {
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);
    split_lines(text)
        .into_iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            parse_task_line(line).map(|(status, description)| (idx + 1, line, status, description))
        })
        .enumerate()
        .map(|(ordinal, (line_number, line, status, description))| Task {
            id: format!("task-{}", ordinal + 1),
            description: description.to_string(),
            status,
            line_number,
            raw_line: line.to_string(),
        })
}
