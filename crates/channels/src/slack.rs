use async_trait::async_trait;
use notebridge_core::{Error, Notification, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Outbound notification sink. Production posts to a Slack-compatible
/// incoming webhook; tests record.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

pub struct SlackWebhook {
    client: Client,
    webhook_url: String,
}

impl SlackWebhook {
    pub fn new(webhook_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Channel(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("webhook post failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!("webhook returned {status}: {body}")));
        }

        debug!(thread_ts = ?notification.thread_ts, "Posted notification");
        Ok(())
    }
}
