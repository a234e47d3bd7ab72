//! File-name slugs derived from guide names.

use chrono::{DateTime, Utc};

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 50;

/// Turn a guide name into a file-name-safe slug.
///
/// Keeps word characters, whitespace and hyphens, joins whitespace runs
/// with `-`, truncates to [`MAX_SLUG_LEN`] characters and lower-cases.
/// Names with nothing usable fall back to `guide-<YYYYmmddHHMMSS>` from `now`.
pub fn slugify(name: &str, now: DateTime<Utc>) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let slug: String = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(MAX_SLUG_LEN)
        .collect::<String>()
        .to_lowercase();

    if slug.is_empty() {
        format!("guide-{}", now.format("%Y%m%d%H%M%S"))
    } else {
        slug
    }
}
