//! Authenticated portal session and guide content extraction.
//!
//! This crate provides:
//! - [`ContentFetcher`]: the seam the publish coordinator fetches through
//! - [`AuthenticatedFetcher`]: cookie-backed portal session with re-validation
//! - [`extract`]: ranked structural extraction rules
//! - [`listing`]: guide cards from the portal's own listing page

pub mod extract;
pub mod listing;
pub mod session;

use async_trait::async_trait;

use guidepress_shared::{Item, Result};

pub use extract::{Extracted, ExtractionRule, MIN_CONTENT_LEN, MIN_PARAGRAPHS, default_rules};
pub use listing::parse_listing;
pub use session::{AuthenticatedFetcher, DEFAULT_FRESHNESS, FetcherOptions, SessionState};

// ---------------------------------------------------------------------------
// FetchResult
// ---------------------------------------------------------------------------

/// Outcome of fetching one guide page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Usable guide content.
    Content {
        /// Clean HTML fragment (chrome stripped).
        html_fragment: String,
        /// Absolute image URLs referenced by the fragment.
        images: Vec<String>,
    },
    /// The page could not provide content; the caller falls back to a teaser.
    Unavailable { reason: String },
}

impl FetchResult {
    /// Build an `Unavailable` result.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether this result carries content.
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Content { .. })
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Source of full guide content.
///
/// Implementations own their session exclusively; callers hold them by
/// `&mut` and use them from one task.
#[async_trait]
pub trait ContentFetcher: Send {
    /// Establish a session. `AuthFailed` means the caller should degrade to
    /// teaser-only publishing.
    async fn authenticate(&mut self) -> Result<()>;

    /// Fetch and extract one page. Errors are reserved for connectivity and
    /// authentication failures.
    async fn fetch(&mut self, url: &str) -> Result<FetchResult>;

    /// Items listed on a portal page, in page order. Fetchers without a
    /// listing source return nothing.
    async fn list_guides(&mut self, _url: &str) -> Result<Vec<Item>> {
        Ok(Vec::new())
    }
}
