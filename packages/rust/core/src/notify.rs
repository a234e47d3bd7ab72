//! Publish notifications.
//!
//! A notifier is told about every successful publish. Delivery is best
//! effort: the result is logged and never changes publication state.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use guidepress_shared::{GuidePressError, PublishMode, Result, RunId};

/// Payload describing one published page.
#[derive(Debug, Clone, Serialize)]
pub struct PublishEvent {
    pub run_id: RunId,
    pub item_key: String,
    pub title: String,
    pub output_ref: String,
    pub url: String,
    pub mode: PublishMode,
    pub published_at: DateTime<Utc>,
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `event`. Returns whether delivery succeeded.
    async fn notify(&self, event: &PublishEvent) -> bool;
}

/// Writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &PublishEvent) -> bool {
        info!(
            run_id = %event.run_id,
            item = %event.item_key,
            output = %event.output_ref,
            mode = ?event.mode,
            "guide published"
        );
        true
    }
}

/// POSTs each event as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("GuidePress/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GuidePressError::Network(format!("client build: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &PublishEvent) -> bool {
        match self.client.post(&self.url).json(event).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), item = %event.item_key, "webhook rejected notification");
                false
            }
            Err(e) => {
                warn!(error = %e, item = %event.item_key, "webhook delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn event() -> PublishEvent {
        PublishEvent {
            run_id: RunId::new(),
            item_key: "Kyoto in Autumn".into(),
            title: "Kyoto in Autumn".into(),
            output_ref: "kyoto-in-autumn.html".into(),
            url: "https://portal.example.com/advisor/a1/content/kyoto".into(),
            mode: PublishMode::Teaser,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "item_key": "Kyoto in Autumn",
                "mode": "teaser"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri()), 5).unwrap();
        assert!(notifier.notify(&event()).await);
    }

    #[tokio::test]
    async fn webhook_failure_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), 5).unwrap();
        assert!(!notifier.notify(&event()).await);

        let unreachable = WebhookNotifier::new("http://127.0.0.1:9/hook", 1).unwrap();
        assert!(!unreachable.notify(&event()).await);
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.notify(&event()).await);
    }
}
