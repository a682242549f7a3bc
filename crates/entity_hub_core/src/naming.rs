//! Entity name helpers.
//!
//! Server names accept ASCII alphanumerics plus a separator. Labels keep the
//! free-form text.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_NAME_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Converts free text into a server-safe lowercase name.
///
/// Runs of characters outside `[a-z0-9]` collapse into one `separator`;
/// leading and trailing separators are dropped. Returns an empty string when
/// nothing usable remains.
pub fn slugify_name(name: &str, separator: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let replaced = NON_NAME_CHARS_RE.replace_all(&lowered, separator);
    if separator.is_empty() {
        return replaced.into_owned();
    }
    replaced
        .trim_start_matches(separator)
        .trim_end_matches(separator)
        .to_string()
}
