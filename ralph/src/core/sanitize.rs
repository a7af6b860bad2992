//! Sanitization of task text before it is embedded in a larger prompt.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum description length, in Unicode scalar values, after trimming.
pub const MAX_TASK_DESCRIPTION_LENGTH: usize = 5000;

static CONTROL_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control char pattern should compile")
});
static EXCESS_NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern should compile"));
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mR)^```").expect("fence pattern should compile"));

const ESCAPED_FENCE: &str = r"\`\`\`";

/// Make a task description safe to embed in a fenced prompt block.
///
/// Truncation runs before stripping so the length limit applies to the raw
/// content. `None` and empty input yield an empty string.
pub fn sanitize_task_description(input: Option<&str>) -> String {
    let Some(input) = input else {
        return String::new();
    };
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let truncated = truncate_chars(trimmed, MAX_TASK_DESCRIPTION_LENGTH);
    let stripped = CONTROL_CHARS_RE.replace_all(truncated, "");
    let collapsed = EXCESS_NEWLINES_RE.replace_all(&stripped, "\n\n");
    FENCE_RE
        .replace_all(&collapsed, regex::NoExpand(ESCAPED_FENCE))
        .into_owned()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
