//! End-to-end publish run: sheet → personalize → dedup → fetch → render → catalog.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use guidepress_fetcher::{AuthenticatedFetcher, ContentFetcher, FetchResult, FetcherOptions};
use guidepress_shared::{
    CatalogEntry, GuidePressError, Item, PublicationRecord, PublishMode, PublishSettings, Result,
    RunId,
};
use guidepress_source::{SourceReader, personalize};
use guidepress_storage::{CatalogIndex, PublicationState};

use crate::notify::{LogNotifier, Notifier, PublishEvent, WebhookNotifier};
use crate::render::{HtmlPageRenderer, PageBody, RenderRequest, Renderer};
use crate::slug::slugify;

// ---------------------------------------------------------------------------
// Options, results, progress
// ---------------------------------------------------------------------------

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report candidates without fetching, rendering or writing anything.
    pub dry_run: bool,
}

/// A guide selected for publishing in this run.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: Item,
    /// Personalized outbound link.
    pub link: String,
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Published { output_ref: String, mode: PublishMode },
    Failed { reason: String },
}

/// Result of a publish run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Usable rows in the source, plus listed portal guides.
    pub items: usize,
    /// Guides read from the portal listing.
    pub listed: usize,
    /// Items that were not yet published.
    pub candidates: Vec<String>,
    pub published: usize,
    /// Published with a teaser body (subset of `published`).
    pub teasers: usize,
    /// Already published, or repeated within the sheet.
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a candidate is processed.
    fn item_started(&self, name: &str, current: usize, total: usize);
    /// Called after a candidate is processed.
    fn item_finished(&self, name: &str, outcome: &ItemOutcome);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn item_finished(&self, _name: &str, _outcome: &ItemOutcome) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Drives one publish run over injected fetcher, renderer and notifier.
pub struct PublishCoordinator {
    settings: PublishSettings,
    renderer: Box<dyn Renderer>,
    fetcher: Option<Box<dyn ContentFetcher>>,
    notifier: Box<dyn Notifier>,
}

impl PublishCoordinator {
    /// Coordinator that publishes teasers only and logs notifications.
    pub fn new(settings: PublishSettings, renderer: Box<dyn Renderer>) -> Self {
        Self {
            settings,
            renderer,
            fetcher: None,
            notifier: Box::new(LogNotifier),
        }
    }

    /// Wire the default components for `settings`: the HTML page renderer,
    /// a portal session when fetching is enabled, and a webhook notifier
    /// when one is configured.
    pub fn from_settings(settings: PublishSettings) -> Result<Self> {
        let renderer = HtmlPageRenderer::new(&settings.output_dir, settings.branding.clone());
        let timeout = settings.request_timeout_secs;

        let fetcher: Option<Box<dyn ContentFetcher>> = match (&settings.portal, settings.fetch_content) {
            (Some(credentials), true) => {
                let options = FetcherOptions {
                    timeout_secs: timeout,
                    ..FetcherOptions::default()
                };
                let fetcher = AuthenticatedFetcher::new(credentials.clone(), options)?;
                Some(Box::new(fetcher) as Box<dyn ContentFetcher>)
            }
            _ => None,
        };

        let notifier: Box<dyn Notifier> = match &settings.notify_webhook_url {
            Some(url) => Box::new(WebhookNotifier::new(url, timeout)?),
            None => Box::new(LogNotifier),
        };

        let mut coordinator = Self::new(settings, Box::new(renderer)).with_notifier(notifier);
        coordinator.fetcher = fetcher;
        Ok(coordinator)
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// Run the full publish pipeline.
    ///
    /// 1. Read the sheet and publication state
    /// 2. Append guides from the portal listing, when one is configured
    /// 3. Personalize links and drop items already published
    /// 4. Authenticate (teaser-only on failure)
    /// 5. Fetch, render, index each candidate in source order
    /// 6. Persist state and catalog once
    ///
    /// Only source and state loading, and the final writes, can fail the
    /// run. Per-item failures are counted and retried next run.
    #[instrument(skip_all, fields(source = %self.settings.source_csv.display(), dry_run = options.dry_run))]
    pub async fn run(
        &mut self,
        options: RunOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let run_id = RunId::new();

        info!(%run_id, "starting publish run");

        // --- Phase 1: Source ---
        progress.phase("Reading guide sheet");
        let mut items = SourceReader::open(&self.settings.source_csv)?.read_all()?;
        let mut state = PublicationState::load(&self.settings.state_file)?;

        // --- Phase 2: Portal listing ---
        let mut session = None;
        let mut listed = 0;
        if !options.dry_run && self.fetch_ready() {
            if let Some(url) = self.settings.portal_guides_url.clone() {
                let ready = self.open_session(progress).await;
                session = Some(ready);
                if ready {
                    match self.read_listing(&url, progress).await {
                        Ok(portal_items) => {
                            listed = portal_items.len();
                            items.extend(portal_items);
                        }
                        Err(e) => {
                            if matches!(e, GuidePressError::AuthFailed(_)) {
                                session = Some(false);
                            }
                            warn!(error = %e, url = %url, "portal listing unavailable, using sheet only");
                        }
                    }
                }
            }
        }

        // --- Phase 3: Dedup ---
        progress.phase("Selecting new guides");
        let (candidates, skipped_duplicate) = select_candidates(&items, &state, &self.settings.advisor_id);

        info!(
            items = items.len(),
            listed,
            candidates = candidates.len(),
            skipped_duplicate,
            "selected candidates"
        );

        let mut summary = RunSummary {
            run_id: run_id.clone(),
            items: items.len(),
            listed,
            candidates: candidates.iter().map(|c| c.item.key().to_string()).collect(),
            published: 0,
            teasers: 0,
            skipped_duplicate,
            failed: 0,
            dry_run: options.dry_run,
            elapsed: Duration::ZERO,
        };

        if options.dry_run {
            summary.elapsed = start.elapsed();
            progress.done(&summary);
            info!(%run_id, candidates = summary.candidates.len(), "dry run complete, nothing written");
            return Ok(summary);
        }

        let mut catalog = CatalogIndex::load(self.settings.catalog_file(), self.settings.catalog_sort);

        // --- Phase 4: Session ---
        let mut fetching = match session {
            Some(ready) => ready,
            None if self.fetch_ready() && !candidates.is_empty() => self.open_session(progress).await,
            None => false,
        };

        // --- Phase 5: Publish ---
        progress.phase("Publishing guides");
        let total = candidates.len();
        for (i, candidate) in candidates.iter().enumerate() {
            let name = candidate.item.key();
            progress.item_started(name, i + 1, total);

            let outcome = self
                .publish_one(candidate, &mut fetching, &run_id, &mut state, &mut catalog)
                .await;

            match &outcome {
                ItemOutcome::Published { mode, .. } => {
                    summary.published += 1;
                    if *mode == PublishMode::Teaser {
                        summary.teasers += 1;
                    }
                }
                ItemOutcome::Failed { reason } => {
                    warn!(item = %name, reason = %reason, "guide not published, will retry next run");
                    summary.failed += 1;
                }
            }
            progress.item_finished(name, &outcome);
        }

        // --- Phase 6: Persist ---
        progress.phase("Saving state");
        if let Err(e) = state.persist() {
            error!(error = %e, "failed to save publication state");
            return Err(e);
        }
        if catalog.is_dirty() {
            if let Err(e) = catalog.persist() {
                error!(error = %e, "failed to save catalog");
                return Err(e);
            }
        }

        summary.elapsed = start.elapsed();
        progress.done(&summary);

        info!(
            %run_id,
            published = summary.published,
            teasers = summary.teasers,
            skipped_duplicate = summary.skipped_duplicate,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis(),
            "publish run complete"
        );

        Ok(summary)
    }

    /// Whether portal content is enabled and a fetcher is wired in.
    fn fetch_ready(&self) -> bool {
        self.settings.fetch_content && self.fetcher.is_some()
    }

    /// Authenticate the fetcher. A failure is logged and means teasers only.
    async fn open_session(&mut self, progress: &dyn ProgressReporter) -> bool {
        let Some(fetcher) = self.fetcher.as_mut() else {
            return false;
        };
        progress.phase("Authenticating with portal");
        match fetcher.authenticate().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "portal authentication failed, publishing teasers only");
                false
            }
        }
    }

    async fn read_listing(
        &mut self,
        url: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Item>> {
        let Some(fetcher) = self.fetcher.as_mut() else {
            return Ok(Vec::new());
        };
        progress.phase("Reading portal listing");
        fetcher.list_guides(url).await
    }

    /// Fetch, render, and record one candidate.
    ///
    /// A rejected session clears `fetching` so the rest of the run publishes
    /// teasers without contacting the portal again.
    async fn publish_one(
        &mut self,
        candidate: &Candidate,
        fetching: &mut bool,
        run_id: &RunId,
        state: &mut PublicationState,
        catalog: &mut CatalogIndex,
    ) -> ItemOutcome {
        let item = &candidate.item;
        let name = item.key();

        let body = match self.fetcher.as_mut().filter(|_| *fetching) {
            Some(fetcher) => match fetcher.fetch(&candidate.link).await {
                Ok(FetchResult::Content {
                    html_fragment,
                    images,
                }) => PageBody::Content {
                    html: html_fragment,
                    images,
                },
                Ok(FetchResult::Unavailable { reason }) => {
                    info!(item = %name, reason = %reason, "content unavailable, publishing teaser");
                    PageBody::Teaser
                }
                Err(GuidePressError::AuthFailed(reason)) => {
                    warn!(
                        item = %name,
                        reason = %reason,
                        "portal session rejected, publishing teasers for the rest of the run"
                    );
                    *fetching = false;
                    PageBody::Teaser
                }
                Err(e) => {
                    return ItemOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            },
            None => PageBody::Teaser,
        };

        let published_at = Utc::now();
        let slug = slugify(name, published_at);
        let request = RenderRequest {
            item,
            slug: &slug,
            link: &candidate.link,
            body: &body,
            published_at,
        };

        let output_ref = match self.renderer.render(&request) {
            Ok(output_ref) => output_ref,
            Err(e) => {
                error!(item = %name, error = %e, "render failed");
                return ItemOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let mode = body.mode();
        let replaced = catalog.upsert(CatalogEntry::for_item(
            item,
            &candidate.link,
            &output_ref,
            published_at,
            mode,
            &self.settings.branding.source_label,
        ));
        warn_on_collision(replaced.as_ref(), name, &output_ref);
        state.record(PublicationRecord {
            item_key: name.to_string(),
            published_at,
            output_ref: output_ref.clone(),
        });

        let event = PublishEvent {
            run_id: run_id.clone(),
            item_key: name.to_string(),
            title: name.to_string(),
            output_ref: output_ref.clone(),
            url: candidate.link.clone(),
            mode,
            published_at,
        };
        if !self.notifier.notify(&event).await {
            debug!(item = %name, "notification not delivered");
        }

        ItemOutcome::Published { output_ref, mode }
    }
}

/// Personalize links and keep the items that are not yet published.
///
/// Returns the candidates in sheet order and how many items were skipped
/// as duplicates (already published, or repeated in the sheet).
pub fn select_candidates(
    items: &[Item],
    state: &PublicationState,
    advisor_id: &str,
) -> (Vec<Candidate>, usize) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut candidates = Vec::new();
    let mut skipped = 0;

    for item in items.iter().filter(|i| i.has_url()) {
        let key = item.key();
        if state.contains(key) {
            debug!(item = %key, "already published");
            skipped += 1;
            continue;
        }
        if !seen.insert(key) {
            debug!(item = %key, "repeated in sheet, processing once");
            skipped += 1;
            continue;
        }
        candidates.push(Candidate {
            item: item.clone(),
            link: personalize(item.raw_url.trim(), advisor_id),
        });
    }

    (candidates, skipped)
}

/// Two names can slug to the same file; the later one wins.
fn warn_on_collision(replaced: Option<&CatalogEntry>, name: &str, output_ref: &str) {
    if let Some(previous) = replaced.filter(|p| p.title != name) {
        warn!(
            file = %output_ref,
            previous = %previous.title,
            current = %name,
            "slug collision, earlier page replaced"
        );
    }
}

// ---------------------------------------------------------------------------
// Catalog rebuild
// ---------------------------------------------------------------------------

/// Reconstruct the catalog from the sheet and publication state.
///
/// Every sheet item whose key is published gets an entry. The recorded
/// output reference and publish time are used when a record exists,
/// otherwise the slug-derived file name and the state's last run time.
/// Publish modes are carried over from the previous catalog where known.
#[instrument(skip_all, fields(source = %settings.source_csv.display()))]
pub fn rebuild_catalog(settings: &PublishSettings) -> Result<usize> {
    let items = SourceReader::open(&settings.source_csv)?.read_all()?;
    let state = PublicationState::load(&settings.state_file)?;
    let previous = CatalogIndex::load(settings.catalog_file(), settings.catalog_sort);

    let mut catalog = CatalogIndex::empty(settings.catalog_file(), settings.catalog_sort);
    let fallback_time = state.last_run().unwrap_or_else(Utc::now);
    let mut seen: HashSet<&str> = HashSet::new();

    for item in &items {
        let key = item.key();
        if !state.contains(key) || !seen.insert(key) {
            continue;
        }

        let record = state.records().iter().find(|r| r.item_key == key);
        let (output_ref, published_at) = match record {
            Some(r) => (r.output_ref.clone(), r.published_at),
            None => (format!("{}.html", slugify(key, fallback_time)), fallback_time),
        };
        let mode = previous
            .get(&output_ref)
            .map(|e| e.mode)
            .unwrap_or_default();
        let link = personalize(item.raw_url.trim(), &settings.advisor_id);

        let replaced = catalog.upsert(CatalogEntry::for_item(
            item,
            &link,
            &output_ref,
            published_at,
            mode,
            &settings.branding.source_label,
        ));
        warn_on_collision(replaced.as_ref(), key, &output_ref);
    }

    let orphaned = state.len().saturating_sub(seen.len());
    if orphaned > 0 {
        warn!(orphaned, "published keys with no matching sheet row were left out");
    }

    catalog.persist()?;
    info!(entries = catalog.len(), "catalog rebuilt");
    Ok(catalog.len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use guidepress_shared::{CatalogSort, SiteBranding};

    use super::*;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Fetcher answering from a URL → result table; unknown URLs are unavailable.
    #[derive(Default)]
    struct StubFetcher {
        auth_fails: bool,
        /// Every `fetch` reports a rejected session.
        session_rejected: bool,
        responses: HashMap<String, Result<FetchResult>>,
        listing: Vec<Item>,
        listing_fails: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ContentFetcher for StubFetcher {
        async fn authenticate(&mut self) -> Result<()> {
            if self.auth_fails {
                Err(GuidePressError::AuthFailed("bad password".into()))
            } else {
                Ok(())
            }
        }

        async fn fetch(&mut self, url: &str) -> Result<FetchResult> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.session_rejected {
                return Err(GuidePressError::AuthFailed("login form rejected".into()));
            }
            match self.responses.get(url) {
                Some(Ok(result)) => Ok(result.clone()),
                Some(Err(_)) => Err(GuidePressError::Network(format!("{url}: connection reset"))),
                None => Ok(FetchResult::unavailable("HTTP 404")),
            }
        }

        async fn list_guides(&mut self, url: &str) -> Result<Vec<Item>> {
            self.calls.lock().unwrap().push(format!("list {url}"));
            if self.listing_fails {
                return Err(GuidePressError::FetchUnavailable {
                    url: url.to_string(),
                    reason: "HTTP 502".into(),
                });
            }
            Ok(self.listing.clone())
        }
    }

    /// Renderer that fails for one item name and records what it rendered.
    #[derive(Default)]
    struct StubRenderer {
        fail_for: Option<String>,
        rendered: Arc<Mutex<Vec<(String, PublishMode)>>>,
    }

    impl Renderer for StubRenderer {
        fn render(&self, request: &RenderRequest<'_>) -> Result<String> {
            if self.fail_for.as_deref() == Some(request.item.key()) {
                return Err(GuidePressError::render(request.item.key(), "template exploded"));
            }
            self.rendered
                .lock()
                .unwrap()
                .push((request.item.key().to_string(), request.body.mode()));
            Ok(format!("{}.html", request.slug))
        }
    }

    /// Renderer that turns `blocker` into a regular file, so later writes
    /// under it fail.
    struct BlockingRenderer {
        blocker: PathBuf,
    }

    impl Renderer for BlockingRenderer {
        fn render(&self, request: &RenderRequest<'_>) -> Result<String> {
            if !self.blocker.exists() {
                std::fs::write(&self.blocker, "in the way").unwrap();
            }
            Ok(format!("{}.html", request.slug))
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gp-pipeline-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn settings(dir: &Path, csv: &str) -> PublishSettings {
        let source = dir.join("guides.csv");
        std::fs::write(&source, csv).unwrap();
        PublishSettings {
            source_csv: source,
            output_dir: dir.join("out"),
            state_file: dir.join("state.json"),
            catalog_sort: CatalogSort::Recency,
            advisor_id: "adv1".into(),
            fetch_content: true,
            portal: None,
            portal_guides_url: None,
            request_timeout_secs: 5,
            branding: SiteBranding::default(),
            notify_webhook_url: None,
        }
    }

    const SHEET: &str = "Name,Magic Content,Country\n\
        A,https://x.com/content/a,Japan\n\
        B,,Peru\n\
        C,https://x.com/content/c,Chile\n";

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn publishes_only_new_items_with_urls() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let mut state = PublicationState::load(&settings.state_file).unwrap();
        state.add("C");
        state.add("Z");
        state.persist().unwrap();

        let renderer = StubRenderer::default();
        let rendered = renderer.rendered.clone();
        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(renderer));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.published, 1);
        assert_eq!(summary.skipped_duplicate, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.candidates, vec!["A"]);
        assert_eq!(rendered.lock().unwrap().as_slice(), [("A".to_string(), PublishMode::Teaser)]);

        let state = PublicationState::load(&settings.state_file).unwrap();
        let mut keys = state.keys().to_vec();
        keys.sort();
        assert_eq!(keys, vec!["A", "C", "Z"]);

        let catalog = CatalogIndex::load(settings.catalog_file(), CatalogSort::Recency);
        assert_eq!(catalog.len(), 1);
        let entry = catalog.get("a.html").unwrap();
        assert_eq!(entry.url, "https://x.com/advisor/adv1/content/a");
        assert_eq!(entry.tags.country, "Japan");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn second_run_publishes_nothing() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let mut first = PublishCoordinator::from_settings(PublishSettings {
            fetch_content: false,
            ..settings.clone()
        })
        .unwrap();
        let summary = first.run(RunOptions::default(), &SilentProgress).await.unwrap();
        assert_eq!(summary.published, 2);
        assert_eq!(summary.teasers, 2);

        let catalog_path = settings.catalog_file();
        let before = std::fs::read_to_string(&catalog_path).unwrap();
        assert!(settings.output_dir.join("a.html").exists());
        assert!(settings.output_dir.join("c.html").exists());

        let renderer = StubRenderer::default();
        let rendered = renderer.rendered.clone();
        let mut second = PublishCoordinator::new(settings.clone(), Box::new(renderer));
        let summary = second.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.published, 0);
        assert_eq!(summary.skipped_duplicate, 2);
        assert!(rendered.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&catalog_path).unwrap(), before);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn fetched_content_and_teaser_fallback() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let mut fetcher = StubFetcher::default();
        fetcher.responses.insert(
            "https://x.com/advisor/adv1/content/a".into(),
            Ok(FetchResult::Content {
                html_fragment: "<p>Full guide</p>".into(),
                images: vec![],
            }),
        );
        let calls = fetcher.calls.clone();

        let renderer = StubRenderer::default();
        let rendered = renderer.rendered.clone();
        let mut coordinator =
            PublishCoordinator::new(settings.clone(), Box::new(renderer)).with_fetcher(Box::new(fetcher));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.published, 2);
        assert_eq!(summary.teasers, 1);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(
            rendered.lock().unwrap().as_slice(),
            [
                ("A".to_string(), PublishMode::Full),
                ("C".to_string(), PublishMode::Teaser),
            ]
        );

        let state = PublicationState::load(&settings.state_file).unwrap();
        assert!(state.contains("C"));
        let catalog = CatalogIndex::load(settings.catalog_file(), CatalogSort::Recency);
        assert_eq!(catalog.get("a.html").unwrap().mode, PublishMode::Full);
        assert_eq!(catalog.get("c.html").unwrap().mode, PublishMode::Teaser);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_authentication_degrades_to_teasers() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let fetcher = StubFetcher {
            auth_fails: true,
            ..StubFetcher::default()
        };
        let calls = fetcher.calls.clone();

        let mut coordinator = PublishCoordinator::new(settings, Box::new(StubRenderer::default()))
            .with_fetcher(Box::new(fetcher));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.published, 2);
        assert_eq!(summary.teasers, 2);
        assert!(calls.lock().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejected_session_stops_fetching_for_the_run() {
        let dir = temp_dir();
        let settings = settings(
            &dir,
            "Name,Magic Content\n\
             A,https://x.com/content/a\n\
             B,https://x.com/content/b\n\
             C,https://x.com/content/c\n\
             D,https://x.com/content/d\n",
        );

        let fetcher = StubFetcher {
            session_rejected: true,
            ..StubFetcher::default()
        };
        let calls = fetcher.calls.clone();

        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(StubRenderer::default()))
            .with_fetcher(Box::new(fetcher));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(calls.lock().unwrap().as_slice(), ["https://x.com/advisor/adv1/content/a"]);
        assert_eq!(summary.published, 4);
        assert_eq!(summary.teasers, 4);
        assert_eq!(summary.failed, 0);
        let state = PublicationState::load(&settings.state_file).unwrap();
        assert_eq!(state.keys(), ["A", "B", "C", "D"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn fetch_errors_leave_item_for_next_run() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let mut fetcher = StubFetcher::default();
        fetcher.responses.insert(
            "https://x.com/advisor/adv1/content/a".into(),
            Err(GuidePressError::Network("reset".into())),
        );

        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(StubRenderer::default()))
            .with_fetcher(Box::new(fetcher));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.published, 1);
        let state = PublicationState::load(&settings.state_file).unwrap();
        assert!(!state.contains("A"));
        assert!(state.contains("C"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn render_failure_does_not_block_later_items() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let renderer = StubRenderer {
            fail_for: Some("A".into()),
            ..StubRenderer::default()
        };
        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(renderer));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.published, 1);
        let state = PublicationState::load(&settings.state_file).unwrap();
        assert_eq!(state.keys(), ["C"]);
        let catalog = CatalogIndex::load(settings.catalog_file(), CatalogSort::Recency);
        assert!(catalog.get("a.html").is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_source_aborts_without_writes() {
        let dir = temp_dir();
        let mut settings = settings(&dir, SHEET);
        settings.source_csv = dir.join("nope.csv");

        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(StubRenderer::default()));
        let err = coordinator
            .run(RunOptions::default(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, GuidePressError::SourceUnavailable { .. }));
        assert!(!settings.state_file.exists());
        assert!(!settings.catalog_file().exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let renderer = StubRenderer::default();
        let rendered = renderer.rendered.clone();
        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(renderer));
        let summary = coordinator
            .run(RunOptions { dry_run: true }, &SilentProgress)
            .await
            .unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.candidates, vec!["A", "C"]);
        assert_eq!(summary.published, 0);
        assert!(rendered.lock().unwrap().is_empty());
        assert!(!settings.state_file.exists());
        assert!(!settings.output_dir.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn state_write_failure_fails_the_run_before_the_catalog() {
        let dir = temp_dir();
        let mut settings = settings(&dir, SHEET);
        let blocker = dir.join("ledger");
        settings.state_file = blocker.join("state.json");

        let mut coordinator =
            PublishCoordinator::new(settings.clone(), Box::new(BlockingRenderer { blocker }));
        let err = coordinator
            .run(RunOptions::default(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, GuidePressError::PersistFailed { .. }));
        assert!(!settings.catalog_file().exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn colliding_slugs_keep_the_later_page() {
        let dir = temp_dir();
        let settings = settings(
            &dir,
            "Name,Magic Content\n\
             Kyoto!,https://x.com/content/k1\n\
             Kyoto?,https://x.com/content/k2\n",
        );

        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(StubRenderer::default()));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.published, 2);
        let catalog = CatalogIndex::load(settings.catalog_file(), CatalogSort::Recency);
        assert_eq!(catalog.len(), 1);
        let entry = catalog.get("kyoto.html").unwrap();
        assert_eq!(entry.title, "Kyoto?");
        assert_eq!(entry.url, "https://x.com/advisor/adv1/content/k2");
        let state = PublicationState::load(&settings.state_file).unwrap();
        assert!(state.contains("Kyoto!"));
        assert!(state.contains("Kyoto?"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn portal_listing_adds_guides_after_the_sheet() {
        let dir = temp_dir();
        let mut settings = settings(&dir, SHEET);
        settings.portal_guides_url = Some("https://x.com/magic-guides".into());

        let fetcher = StubFetcher {
            listing: vec![
                Item {
                    name: "Douro Valley".into(),
                    description: "Port lodges and terraces".into(),
                    raw_url: "https://x.com/content/douro".into(),
                    ..Item::default()
                },
                Item {
                    name: "A".into(),
                    raw_url: "https://x.com/content/a".into(),
                    ..Item::default()
                },
            ],
            ..StubFetcher::default()
        };
        let calls = fetcher.calls.clone();

        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(StubRenderer::default()))
            .with_fetcher(Box::new(fetcher));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.listed, 2);
        assert_eq!(summary.candidates, vec!["A", "C", "Douro Valley"]);
        assert_eq!(summary.skipped_duplicate, 1);
        assert_eq!(summary.published, 3);
        assert_eq!(calls.lock().unwrap()[0], "list https://x.com/magic-guides");

        let catalog = CatalogIndex::load(settings.catalog_file(), CatalogSort::Recency);
        let entry = catalog.get("douro-valley.html").unwrap();
        assert_eq!(entry.url, "https://x.com/advisor/adv1/content/douro");
        assert_eq!(entry.description, "Port lodges and terraces");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unreadable_listing_falls_back_to_the_sheet() {
        let dir = temp_dir();
        let mut settings = settings(&dir, SHEET);
        settings.portal_guides_url = Some("https://x.com/magic-guides".into());

        let fetcher = StubFetcher {
            listing_fails: true,
            ..StubFetcher::default()
        };

        let mut coordinator = PublishCoordinator::new(settings, Box::new(StubRenderer::default()))
            .with_fetcher(Box::new(fetcher));
        let summary = coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        assert_eq!(summary.listed, 0);
        assert_eq!(summary.candidates, vec!["A", "C"]);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.failed, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn repeated_names_are_processed_once() {
        let items = vec![
            Item {
                name: "Kyoto".into(),
                raw_url: "https://x.com/content/k1".into(),
                ..Item::default()
            },
            Item {
                name: " Kyoto ".into(),
                raw_url: "https://x.com/content/k2".into(),
                ..Item::default()
            },
            Item {
                name: "Lisbon".into(),
                raw_url: "https://x.com/advisor/adv1/content/l".into(),
                ..Item::default()
            },
        ];
        let state = PublicationState::empty("unused.json");
        let (candidates, skipped) = select_candidates(&items, &state, "adv1");

        assert_eq!(skipped, 1);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].link, "https://x.com/advisor/adv1/content/k1");
        assert_eq!(candidates[1].link, "https://x.com/advisor/adv1/content/l");
    }

    #[tokio::test]
    async fn rebuild_restores_catalog_from_state() {
        let dir = temp_dir();
        let settings = settings(&dir, SHEET);

        let mut coordinator = PublishCoordinator::new(settings.clone(), Box::new(StubRenderer::default()));
        coordinator.run(RunOptions::default(), &SilentProgress).await.unwrap();

        let original = CatalogIndex::load(settings.catalog_file(), CatalogSort::Recency);
        std::fs::remove_file(settings.catalog_file()).unwrap();

        let count = rebuild_catalog(&settings).unwrap();
        assert_eq!(count, 2);

        let rebuilt = CatalogIndex::load(settings.catalog_file(), CatalogSort::Recency);
        let names = |c: &CatalogIndex| {
            let mut v: Vec<String> = c.entries().iter().map(|e| e.filename.clone()).collect();
            v.sort();
            v
        };
        assert_eq!(names(&rebuilt), names(&original));
        assert_eq!(
            rebuilt.get("a.html").unwrap().published_date,
            original.get("a.html").unwrap().published_date
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
