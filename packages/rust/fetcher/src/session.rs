//! Authenticated portal session.
//!
//! The fetcher owns one cookie-backed HTTP client and walks a small state
//! machine: `Unauthenticated → Authenticated → Expired → Authenticated`.
//! A session is trusted for [`DEFAULT_FRESHNESS`] after login; past that the
//! next request logs in again first.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use guidepress_shared::{GuidePressError, Item, PortalCredentials, Result};

use crate::extract::{ExtractionRule, default_rules, extract};
use crate::listing::parse_listing;
use crate::{ContentFetcher, FetchResult};

/// User-Agent string for portal requests.
const USER_AGENT: &str = concat!("GuidePress/", env!("CARGO_PKG_VERSION"));

/// How long a successful login is trusted without re-validation.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(24 * 60 * 60);

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Marker in a response body that shows the user is signed in.
const SIGNED_IN_MARKER: &str = "logout";

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Where the portal session currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No successful login yet (or the last attempt failed).
    Unauthenticated,
    /// Logged in at `at`; `since` is the monotonic instant of the same event.
    Authenticated { at: DateTime<Utc>, since: Instant },
    /// A previous login is too old or was rejected by the portal.
    Expired { last: DateTime<Utc> },
}

/// Tuning knobs for [`AuthenticatedFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// How long a login stays trusted.
    pub freshness: Duration,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            freshness: DEFAULT_FRESHNESS,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthenticatedFetcher
// ---------------------------------------------------------------------------

/// Owns the portal session and fetches guide content through it.
pub struct AuthenticatedFetcher {
    client: Client,
    credentials: PortalCredentials,
    state: SessionState,
    freshness: Duration,
    rules: Vec<ExtractionRule>,
}

impl AuthenticatedFetcher {
    /// Create a fetcher with its own cookie store.
    pub fn new(credentials: PortalCredentials, options: FetcherOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| GuidePressError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            state: SessionState::Unauthenticated,
            freshness: options.freshness,
            rules: default_rules(),
        })
    }

    /// Replace the extraction cascade.
    pub fn with_rules(mut self, rules: Vec<ExtractionRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Current session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether the session is authenticated and still inside the freshness window.
    pub fn is_fresh(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { since, .. } if since.elapsed() < self.freshness)
    }

    /// Log in to the portal.
    ///
    /// Loads the login page first so the portal can set its session cookies,
    /// then posts the credentials. The login counts only if the response
    /// shows a logout affordance.
    #[instrument(skip_all, fields(login_url = %self.credentials.login_url))]
    pub async fn login(&mut self) -> Result<()> {
        info!(username = %self.credentials.username, "authenticating with portal");

        let login_url = self.credentials.login_url.clone();
        let page = self
            .client
            .get(&login_url)
            .send()
            .await
            .map_err(|e| GuidePressError::Network(format!("{login_url}: {e}")))?;

        if !page.status().is_success() {
            self.state = SessionState::Unauthenticated;
            return Err(GuidePressError::AuthFailed(format!(
                "login page returned HTTP {}",
                page.status()
            )));
        }

        let form = [
            ("username", self.credentials.username.as_str()),
            ("email", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        let response = self
            .client
            .post(&login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GuidePressError::Network(format!("{login_url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GuidePressError::Network(format!("{login_url}: body read failed: {e}")))?;

        let accepted = status.is_success() || status.is_redirection();
        if accepted && body.to_lowercase().contains(SIGNED_IN_MARKER) {
            self.state = SessionState::Authenticated {
                at: Utc::now(),
                since: Instant::now(),
            };
            info!("portal session established");
            Ok(())
        } else {
            self.state = SessionState::Unauthenticated;
            warn!(%status, "portal login was not accepted");
            Err(GuidePressError::AuthFailed(format!(
                "no signed-in page after login (HTTP {status})"
            )))
        }
    }

    /// Make sure the session is usable, logging in again only when it is
    /// missing or older than the freshness window.
    pub async fn ensure_valid(&mut self) -> Result<()> {
        if self.is_fresh() {
            return Ok(());
        }

        if let SessionState::Authenticated { at, .. } = self.state {
            info!(authenticated_at = %at, "portal session expired, re-validating");
            self.state = SessionState::Expired { last: at };
        }

        self.login().await
    }

    /// Fetch one guide page and extract its content.
    ///
    /// HTTP errors and pages without usable content come back as
    /// [`FetchResult::Unavailable`]; only connectivity and login failures
    /// are errors.
    #[instrument(skip(self))]
    pub async fn fetch_guide(&mut self, url: &str) -> Result<FetchResult> {
        let page_url = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => return Ok(FetchResult::unavailable(format!("invalid URL: {e}"))),
        };

        self.ensure_valid().await?;

        let response = self
            .client
            .get(page_url.as_str())
            .send()
            .await
            .map_err(|e| GuidePressError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            if let SessionState::Authenticated { at, .. } = self.state {
                self.state = SessionState::Expired { last: at };
            }
            warn!(%status, "portal rejected session");
            return Ok(FetchResult::unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Ok(FetchResult::unavailable(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GuidePressError::Network(format!("{url}: body read failed: {e}")))?;

        match extract(&body, &page_url, &self.rules) {
            Some(extracted) => {
                debug!(rule = %extracted.rule, images = extracted.images.len(), "content extracted");
                Ok(FetchResult::Content {
                    html_fragment: extracted.html,
                    images: extracted.images,
                })
            }
            None => Ok(FetchResult::unavailable("no extraction rule matched")),
        }
    }

    /// Read the portal's guide listing.
    ///
    /// Unlike guide pages, a listing that cannot be read is an error: the
    /// caller decides whether to carry on with its other sources.
    #[instrument(skip(self))]
    pub async fn fetch_listing(&mut self, url: &str) -> Result<Vec<Item>> {
        let listing_url = Url::parse(url).map_err(|e| GuidePressError::FetchUnavailable {
            url: url.to_string(),
            reason: format!("invalid URL: {e}"),
        })?;

        self.ensure_valid().await?;

        let response = self
            .client
            .get(listing_url.as_str())
            .send()
            .await
            .map_err(|e| GuidePressError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                if let SessionState::Authenticated { at, .. } = self.state {
                    self.state = SessionState::Expired { last: at };
                }
            }
            return Err(GuidePressError::FetchUnavailable {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| GuidePressError::Network(format!("{url}: body read failed: {e}")))?;

        let items = parse_listing(&body, &listing_url);
        info!(guides = items.len(), "portal listing read");
        Ok(items)
    }
}

#[async_trait]
impl ContentFetcher for AuthenticatedFetcher {
    async fn authenticate(&mut self) -> Result<()> {
        self.login().await
    }

    async fn fetch(&mut self, url: &str) -> Result<FetchResult> {
        self.fetch_guide(url).await
    }

    async fn list_guides(&mut self, url: &str) -> Result<Vec<Item>> {
        self.fetch_listing(url).await
    }
}
