use notebridge_channels::{Notifier, QueueSource};
use notebridge_core::{Config, Notification, QueueMessage, Result};
use notebridge_session::{QueryExecutor, Session, SessionRegistry};
use notebridge_storage::BlobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const ANSWER_TITLE: &str = "Answer from the notebook";
const ACK_TEXT: &str = "(Querying the notebook...)";

/// Consumes queue messages one at a time and drives a query per message.
///
/// Strictly sequential: the next message is not received until the current
/// one is handled and acknowledged, so two messages for the same thread can
/// never race. Handler failures are logged at this boundary and the message
/// is acknowledged regardless; redelivery policy belongs to the queue.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    executor: QueryExecutor,
    notifier: Arc<dyn Notifier>,
    queue: Arc<dyn QueueSource>,
    blob: Arc<dyn BlobStore>,
    debug_snapshots: bool,
    acknowledge: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        executor: QueryExecutor,
        notifier: Arc<dyn Notifier>,
        queue: Arc<dyn QueueSource>,
        blob: Arc<dyn BlobStore>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            executor,
            notifier,
            queue,
            blob,
            debug_snapshots: config.debug_snapshots,
            acknowledge: config.acknowledge,
        }
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!("Dispatcher started");
        loop {
            tokio::select! {
                result = self.poll_once() => {
                    if let Err(e) = result {
                        error!(error = %e, "Queue receive failed");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// One receive/handle/acknowledge round. `Ok(true)` when a message was
    /// processed, `Ok(false)` when the long poll came back empty.
    pub async fn poll_once(&self) -> Result<bool> {
        let Some(delivery) = self.queue.receive().await? else {
            return Ok(false);
        };

        if let Err(e) = self.handle(&delivery.body).await {
            error!(error = %e, id = %delivery.id, "Message handling failed");
        }
        if let Err(e) = self.queue.acknowledge(&delivery).await {
            error!(error = %e, id = %delivery.id, "Acknowledge failed");
        }
        Ok(true)
    }

    async fn handle(&self, payload: &str) -> Result<()> {
        let message: QueueMessage = serde_json::from_str(payload)?;
        let root = message.thread_root().to_string();
        info!(thread_id = %root, user = %message.slack.user, "Handling query");

        if self.acknowledge {
            // Best-effort; a missing ack must not block the query.
            if let Err(e) = self
                .notifier
                .notify(&Notification::acknowledgment(&root, ACK_TEXT))
                .await
            {
                warn!(error = %e, "Acknowledgment post failed");
            }
        }

        let session = self.registry.get_or_create(&root).await?;

        self.snapshot(&session, &root).await;
        let result = self.executor.run(&session, message.query_text()).await;
        self.snapshot(&session, &root).await;

        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                // The surface is in an unknown state; drop the session so
                // the next message for this thread starts fresh.
                self.registry.remove(&root).await;
                return Err(e);
            }
        };

        self.notifier
            .notify(&Notification::answer(
                &root,
                &message.slack.user,
                ANSWER_TITLE,
                &answer,
            ))
            .await?;
        info!(thread_id = %root, "Replied to origin thread");
        Ok(())
    }

    /// Best-effort screenshot and page dump for post-mortem debugging.
    async fn snapshot(&self, session: &Session, root: &str) {
        if !self.debug_snapshots {
            return;
        }
        match session.surface().screenshot().await {
            Ok(png) => {
                let key = format!("screenshot/finally-{root}.png");
                if let Err(e) = self.blob.put(&key, png, "image/png").await {
                    warn!(error = %e, "Debug snapshot upload failed");
                }
            }
            Err(e) => warn!(error = %e, "Debug snapshot failed"),
        }
        match session.surface().html().await {
            Ok(html) => {
                let key = format!("html/finally-{root}.html");
                if let Err(e) = self.blob.put(&key, html.into_bytes(), "text/html").await {
                    warn!(error = %e, "Debug page dump upload failed");
                }
            }
            Err(e) => warn!(error = %e, "Debug page dump failed"),
        }
    }
}
