//! Rendering for reads, grep results, and oversized tool output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_PREVIEW_LINES, EMPTY_CONTENT_WARNING, LINE_NUMBER_WIDTH, MAX_LINE_LENGTH, NO_MATCHES,
    NUM_CHARS_PER_TOKEN, TOOL_RESULT_TOKEN_LIMIT,
};
use crate::types::GrepMatch;

/// Render lines `cat -n` style, numbering from `start_line`.
///
/// Lines over [`MAX_LINE_LENGTH`] characters are chunked; the first chunk
/// carries the line number and the rest are labelled `N.1`, `N.2`, ...
pub fn format_lines_with_numbers<S: AsRef<str>>(lines: &[S], start_line: usize) -> String {
    let mut rows: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let line_num = start_line + i;
        if line.chars().count() <= MAX_LINE_LENGTH {
            rows.push(format!("{line_num:>LINE_NUMBER_WIDTH$}\t{line}"));
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        for (ci, chunk) in chars.chunks(MAX_LINE_LENGTH).enumerate() {
            let chunk: String = chunk.iter().collect();
            if ci == 0 {
                rows.push(format!("{line_num:>LINE_NUMBER_WIDTH$}\t{chunk}"));
            } else {
                let label = format!("{line_num}.{ci}");
                rows.push(format!("{label:>LINE_NUMBER_WIDTH$}\t{chunk}"));
            }
        }
    }
    rows.join("\n")
}

/// Render one page of a file.
///
/// Zero lines yields [`EMPTY_CONTENT_WARNING`]. An offset at or past the end
/// yields a "no content" notice rather than an error. When lines remain past
/// the page, a trailer names the remaining count and the offset to resume at.
pub fn format_read_response<S: AsRef<str>>(lines: &[S], offset: usize, limit: usize) -> String {
    let total = lines.len();
    if total == 0 {
        return EMPTY_CONTENT_WARNING.to_string();
    }
    if offset >= total || limit == 0 {
        return format!("No content at offset {offset} (file has {total} lines)");
    }

    let end = offset.saturating_add(limit).min(total);
    let mut out = format_lines_with_numbers(&lines[offset..end], offset + 1);
    if end < total {
        let remaining = total - end;
        out.push_str(&format!(
            "\n\n... ({remaining} more lines. Use offset={end} to continue reading)"
        ));
    }
    out
}

/// Truncate to the default tool result budget.
pub fn truncate_if_too_long(result: &str) -> String {
    truncate_to_tokens(result, TOOL_RESULT_TOKEN_LIMIT)
}

/// Keep the head and tail halves of a `token_limit * 4` character window.
pub fn truncate_to_tokens(result: &str, token_limit: usize) -> String {
    let char_limit = token_limit * NUM_CHARS_PER_TOKEN;
    let len = result.chars().count();
    if len <= char_limit {
        return result.to_string();
    }
    let half = char_limit / 2;
    let head: String = result.chars().take(half).collect();
    let tail: String = result.chars().skip(len - half).collect();
    format!(
        "{head}\n\n... (truncated {} characters) ...\n\n{tail}",
        len - char_limit
    )
}

/// Head and tail preview of long content, [`DEFAULT_PREVIEW_LINES`] lines.
pub fn create_content_preview(content: &str) -> String {
    create_content_preview_with(content, DEFAULT_PREVIEW_LINES)
}

/// Head and tail preview keeping `max_lines` lines in total.
pub fn create_content_preview_with(content: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.len() <= max_lines {
        return content.to_string();
    }
    let keep = max_lines / 2;
    let head = lines[..keep].join("\n");
    let tail = lines[lines.len() - keep..].join("\n");
    let omitted = lines.len() - max_lines;
    format!("{head}\n\n... ({omitted} lines omitted) ...\n\n{tail}")
}

/// How grep results are rendered for a caller.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputMode {
    /// Unique paths, first-seen order.
    #[default]
    FilesWithMatches,
    /// `path:line:text` per match.
    Content,
    /// `path: n` per file, sorted by path.
    Count,
}

/// Render grep matches.
pub fn format_grep_matches(matches: &[GrepMatch], mode: OutputMode) -> String {
    if matches.is_empty() {
        return NO_MATCHES.to_string();
    }
    match mode {
        OutputMode::FilesWithMatches => {
            let mut seen = std::collections::HashSet::new();
            matches
                .iter()
                .filter(|m| seen.insert(m.path.as_str()))
                .map(|m| m.path.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        }
        OutputMode::Count => {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for m in matches {
                *counts.entry(m.path.as_str()).or_default() += 1;
            }
            counts
                .iter()
                .map(|(path, n)| format!("{path}: {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
        OutputMode::Content => matches
            .iter()
            .map(|m| format!("{}:{}:{}", m.path, m.line, m.text))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
