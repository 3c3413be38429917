use async_trait::async_trait;
use notebridge_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One raw message pulled off the queue. `body` is the JSON payload the
/// producer enqueued; `id` is the receipt handle used to acknowledge.
#[derive(Debug, Clone)]
pub struct QueueDelivery {
    pub id: String,
    pub body: String,
}

/// Single-message queue consumption. The worker calls `receive` in a loop
/// and acknowledges each delivery after handling; redelivery of
/// unacknowledged messages is the queue's own policy.
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Long-poll for at most one message. `Ok(None)` when the wait expired
    /// with nothing queued.
    async fn receive(&self) -> Result<Option<QueueDelivery>>;

    async fn acknowledge(&self, delivery: &QueueDelivery) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    #[serde(default)]
    messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
struct ReceivedMessage {
    id: String,
    body: String,
}

/// HTTP long-poll client against the configured queue endpoint.
pub struct HttpQueueSource {
    client: Client,
    queue_url: String,
    wait_secs: u64,
}

impl HttpQueueSource {
    pub fn new(queue_url: &str) -> Result<Self> {
        let wait_secs = 20;
        let client = Client::builder()
            // Leave headroom above the long-poll window.
            .timeout(Duration::from_secs(wait_secs + 10))
            .build()
            .map_err(|e| Error::Queue(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            queue_url: queue_url.trim_end_matches('/').to_string(),
            wait_secs,
        })
    }
}

#[async_trait]
impl QueueSource for HttpQueueSource {
    async fn receive(&self) -> Result<Option<QueueDelivery>> {
        let response = self
            .client
            .get(format!("{}/messages", self.queue_url))
            .query(&[("max", "1"), ("wait", &self.wait_secs.to_string())])
            .send()
            .await
            .map_err(|e| Error::Queue(format!("receive failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Queue(format!("receive returned {status}")));
        }

        let body: ReceiveResponse = response
            .json()
            .await
            .map_err(|e| Error::Queue(format!("receive parse: {e}")))?;

        Ok(body.messages.into_iter().next().map(|m| {
            debug!(id = %m.id, "Received queue message");
            QueueDelivery {
                id: m.id,
                body: m.body,
            }
        }))
    }

    async fn acknowledge(&self, delivery: &QueueDelivery) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/messages/{}", self.queue_url, delivery.id))
            .send()
            .await
            .map_err(|e| Error::Queue(format!("acknowledge failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Queue(format!("acknowledge returned {status}")));
        }
        debug!(id = %delivery.id, "Acknowledged queue message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_response_tolerates_empty() {
        let parsed: ReceiveResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.messages.is_empty());

        let parsed: ReceiveResponse =
            serde_json::from_str(r#"{"messages":[{"id":"m1","body":"{}"}]}"#).unwrap();
        assert_eq!(parsed.messages[0].id, "m1");
    }
}
