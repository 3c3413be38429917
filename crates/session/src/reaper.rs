use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

use crate::registry::SessionRegistry;

/// Periodic sweep evicting sessions idle past the TTL.
///
/// Runs independently of message traffic; the registry's own lock isolates
/// it from in-flight session creation. A quiet tick logs nothing.
pub struct SessionReaper {
    registry: Arc<SessionRegistry>,
    ttl_ms: i64,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(registry: Arc<SessionRegistry>, ttl_ms: i64, interval: Duration) -> Self {
        Self {
            registry,
            ttl_ms,
            interval,
        }
    }

    pub async fn sweep(&self) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let evicted = self.registry.evict_if_idle(now_ms, self.ttl_ms).await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle sessions");
        }
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            ttl_ms = self.ttl_ms,
            interval_secs = self.interval.as_secs(),
            "SessionReaper started"
        );

        let mut interval = tokio::time::interval(self.interval);
        // The immediate first tick is harmless: nothing can be idle yet.
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    info!("SessionReaper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthManager;
    use crate::testutil::{MemoryBlob, RecordingNotifier};
    use notebridge_automation::testing::{new_log, MockContext};
    use notebridge_core::{Config, IdleBasis};

    fn registry() -> Arc<SessionRegistry> {
        let log = new_log();
        let context = Arc::new(MockContext::new(log));
        let mut cfg = Config::default();
        cfg.app_url = "https://notebook.example/app".to_string();
        let auth = Arc::new(AuthManager::new(
            context.clone(),
            Arc::new(MemoryBlob::default()),
            Arc::new(RecordingNotifier::default()),
            &cfg,
        ));
        Arc::new(SessionRegistry::new(
            context,
            auth,
            &cfg.app_url,
            IdleBasis::ThreadTimestamp,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_expired_only() {
        let registry = registry();
        // An ancient thread id and a current one.
        registry.get_or_create("1000.0").await.unwrap();
        let now_secs = chrono::Utc::now().timestamp();
        registry.get_or_create(&format!("{now_secs}.0")).await.unwrap();

        let ttl_ms = 12 * 60 * 60 * 1000;
        let reaper = SessionReaper::new(registry.clone(), ttl_ms, Duration::from_secs(300));
        reaper.sweep().await;

        assert_eq!(registry.size().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_on_shutdown() {
        let registry = registry();
        let reaper = Arc::new(SessionReaper::new(
            registry,
            1000,
            Duration::from_secs(300),
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(reaper.run_loop(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
