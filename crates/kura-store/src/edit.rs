//! Exact string replacement.
//!
//! Shared by every backend so ambiguity handling is identical everywhere.

use crate::error::EditError;

/// Replace `old` with `new` in `content`.
///
/// Returns the new content and the number of occurrences replaced. An
/// `old` that occurs more than once is rejected unless `replace_all` is set.
pub fn perform_string_replacement(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<(String, usize), EditError> {
    if old == new {
        return Err(EditError::Identical);
    }
    // An empty needle "occurs" between every character; treat it as absent.
    if old.is_empty() {
        return Err(EditError::NotFound);
    }

    let count = content.matches(old).count();
    match count {
        0 => Err(EditError::NotFound),
        1 => Ok((content.replacen(old, new, 1), 1)),
        n if replace_all => Ok((content.replace(old, new), n)),
        n => Err(EditError::Ambiguous { count: n }),
    }
}
