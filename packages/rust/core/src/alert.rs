//! Cost alert delivery.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use ledgersync_shared::{LedgerSyncError, Result};

/// Where budget alerts go. Callers treat delivery as best-effort.
pub trait AlertSink: Send + Sync {
    fn notify(&self, message: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Posts `{"text": message}` to a chat webhook (Slack, Mattermost, ...).
pub struct WebhookAlert {
    client: Client,
    url: Url,
}

impl WebhookAlert {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| LedgerSyncError::config(format!("invalid webhook URL: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LedgerSyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

impl AlertSink for WebhookAlert {
    async fn notify(&self, message: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url.clone())
            .json(&json!({ "text": message }))
            .send()
            .await
            .map_err(|e| LedgerSyncError::Network(format!("alert webhook failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(LedgerSyncError::Network(format!(
                "alert webhook returned HTTP {}",
                resp.status()
            )));
        }
        info!("cost alert delivered");
        Ok(())
    }
}

/// Writes the alert to the log at warn level.
pub struct LogAlert;

impl AlertSink for LogAlert {
    async fn notify(&self, message: &str) -> Result<()> {
        warn!(alert = message, "cost alert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn webhook_posts_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/abc"))
            .and(body_json(json!({ "text": "over budget" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookAlert::new(&format!("{}/hooks/abc", server.uri())).unwrap();
        sink.notify("over budget").await.unwrap();
    }

    #[tokio::test]
    async fn webhook_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookAlert::new(&server.uri()).unwrap();
        assert!(sink.notify("x").await.is_err());
    }

    #[tokio::test]
    async fn log_alert_never_fails() {
        LogAlert.notify("x").await.unwrap();
    }
}
