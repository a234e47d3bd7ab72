//! Publish orchestration for GuidePress.
//!
//! This crate ties the sheet reader, portal fetcher, page renderer and the
//! JSON stores together into one run (`PublishCoordinator::run`).

pub mod notify;
pub mod pipeline;
pub mod render;
pub mod slug;

pub use notify::{LogNotifier, Notifier, PublishEvent, WebhookNotifier};
pub use pipeline::{
    Candidate, ItemOutcome, ProgressReporter, PublishCoordinator, RunOptions, RunSummary,
    SilentProgress, rebuild_catalog, select_candidates,
};
pub use render::{HtmlPageRenderer, PageBody, RenderRequest, Renderer};
pub use slug::slugify;
