//! Rendering limits and fixed messages.
//!
//! Callers that compare rendered output byte-for-byte depend on these.

/// Lines longer than this many characters are split into continuation rows.
pub const MAX_LINE_LENGTH: usize = 5000;

/// Width of the right-aligned line-number column.
pub const LINE_NUMBER_WIDTH: usize = 6;

/// Default page size for backend reads.
pub const DEFAULT_READ_LIMIT: usize = 2000;

/// Default page size for the tool layer.
pub const DEFAULT_TOOL_READ_LIMIT: usize = 100;

/// Rough token budget for a single tool result.
pub const TOOL_RESULT_TOKEN_LIMIT: usize = 20_000;

/// Characters per token used when converting the budget.
pub const NUM_CHARS_PER_TOKEN: usize = 4;

/// Lines kept by [`crate::format::create_content_preview`].
pub const DEFAULT_PREVIEW_LINES: usize = 20;

/// Returned instead of a rendering when a file has no content.
pub const EMPTY_CONTENT_WARNING: &str = "System reminder: File exists but has empty contents";

/// Formatted grep output when nothing matched.
pub const NO_MATCHES: &str = "No matches found.";

/// Default disk backend file size limit, in MiB.
pub const DEFAULT_MAX_FILE_SIZE_MB: f64 = 10.0;

/// Default ripgrep timeout, in seconds.
pub const DEFAULT_GREP_TIMEOUT_SECS: u64 = 30;
