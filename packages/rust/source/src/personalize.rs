//! Advisor link personalization.
//!
//! Portal links are attributed to an advisor by prefixing their path with
//! `/advisor/<token>`: `https://x.com/content/1` becomes
//! `https://x.com/advisor/<token>/content/1`.

use url::Url;

/// Path segment that introduces the advisor token.
const ADVISOR_SEGMENT: &str = "advisor";

/// Embed `token` into `url` right after the authority.
///
/// Returns `url` unchanged when it is not an absolute `http`/`https`
/// reference, when the token (or any advisor segment) is already present,
/// or when there is no path to prefix. Applying it twice is the same as
/// applying it once.
pub fn personalize(url: &str, token: &str) -> String {
    if token.is_empty() || url.contains(token) {
        return url.to_string();
    }

    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return url.to_string(),
    }

    if url.contains(&format!("/{ADVISOR_SEGMENT}/")) {
        return url.to_string();
    }

    match authority_end(url) {
        Some(end) => format!(
            "{}/{ADVISOR_SEGMENT}/{token}{}",
            &url[..end],
            &url[end..]
        ),
        None => url.to_string(),
    }
}

/// Byte offset of the `/` that starts the path, if the URL has one.
fn authority_end(url: &str) -> Option<usize> {
    let start = url.find("://")? + 3;
    let offset = url[start..].find(['/', '?', '#'])?;
    let end = start + offset;
    (url.as_bytes()[end] == b'/').then_some(end)
}
