use notebridge_automation::SurfaceContext;
use notebridge_core::{IdleBasis, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::auth::AuthManager;
use crate::session::Session;

/// Maps a thread root id to exactly one live session.
///
/// The single map lock is the synchronization discipline: handler-side
/// creation and reaper-side eviction serialize on it, so an eviction can
/// never race the creation of the same key.
pub struct SessionRegistry {
    context: Arc<dyn SurfaceContext>,
    auth: Arc<AuthManager>,
    app_url: String,
    idle_basis: IdleBasis,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(
        context: Arc<dyn SurfaceContext>,
        auth: Arc<AuthManager>,
        app_url: &str,
        idle_basis: IdleBasis,
    ) -> Self {
        Self {
            context,
            auth,
            app_url: app_url.to_string(),
            idle_basis,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the session for `root_thread_id`, opening a fresh surface
    /// against the shared context when the thread is new. Creation verifies
    /// the context is authenticated first.
    pub async fn get_or_create(&self, root_thread_id: &str) -> Result<Arc<Session>> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(root_thread_id) {
            debug!(thread_id = %root_thread_id, "Reusing session");
            session.touch(now_ms);
            return Ok(session.clone());
        }

        self.auth.ensure_authenticated().await?;

        let surface = self.context.new_surface().await?;
        surface.goto(&self.app_url).await?;
        surface.wait_settled().await?;

        let session = Arc::new(Session::new(root_thread_id, surface, now_ms));
        sessions.insert(root_thread_id.to_string(), session.clone());
        info!(thread_id = %root_thread_id, total = sessions.len(), "Opened session");
        Ok(session)
    }

    /// Evict every session idle strictly longer than `ttl_ms`. Close
    /// failures are logged and never keep an entry in the map; malformed
    /// thread ids are skipped with a warning and never abort the sweep.
    pub async fn evict_if_idle(&self, now_ms: i64, ttl_ms: i64) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;

        let expired: Vec<String> = sessions
            .iter()
            .filter_map(|(id, session)| {
                match session.idle_elapsed_ms(now_ms, self.idle_basis) {
                    Some(elapsed) if elapsed > ttl_ms => Some(id.clone()),
                    Some(_) => None,
                    None => {
                        warn!(thread_id = %id, "Unparseable thread id, skipping");
                        None
                    }
                }
            })
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                if let Err(e) = session.surface().close().await {
                    error!(error = %e, thread_id = %id, "Surface close failed during eviction");
                }
            }
        }
        expired
    }

    /// Explicit eviction hook for error paths.
    pub async fn remove(&self, thread_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(thread_id) {
            Some(session) => {
                if let Err(e) = session.surface().close().await {
                    error!(error = %e, thread_id = %thread_id, "Surface close failed on removal");
                }
                true
            }
            None => false,
        }
    }

    pub async fn size(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryBlob, RecordingNotifier};
    use notebridge_automation::testing::{new_log, CallLog, MockContext, MockSurface};
    use notebridge_core::Config;

    const TTL_MS: i64 = 12 * 60 * 60 * 1000;

    fn registry(log: &CallLog) -> (SessionRegistry, Arc<MockContext>) {
        let context = Arc::new(MockContext::new(log.clone()));
        let mut cfg = Config::default();
        cfg.app_url = "https://notebook.example/app".to_string();
        let auth = Arc::new(AuthManager::new(
            context.clone(),
            Arc::new(MemoryBlob::default()),
            Arc::new(RecordingNotifier::default()),
            &cfg,
        ));
        (
            SessionRegistry::new(context.clone(), auth, &cfg.app_url, IdleBasis::ThreadTimestamp),
            context,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_reuses_session() {
        let log = new_log();
        let (registry, _ctx) = registry(&log);

        let first = registry.get_or_create("1700000000.1").await.unwrap();
        let second = registry.get_or_create("1700000000.1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.size().await, 1);

        // Exactly one surface was opened and navigated.
        let calls = log.lock().unwrap().clone();
        let goto_count = calls
            .iter()
            .filter(|c| *c == "goto https://notebook.example/app")
            .count();
        // Bootstrap surface + the session surface both navigate; the reuse
        // path adds none.
        assert_eq!(goto_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_threads_get_distinct_sessions() {
        let log = new_log();
        let (registry, _ctx) = registry(&log);

        let a = registry.get_or_create("100.0").await.unwrap();
        let b = registry.get_or_create("200.0").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.size().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_only_past_ttl_strictly() {
        let log = new_log();
        let (registry, _ctx) = registry(&log);

        // Thread timestamps in epoch seconds.
        registry.get_or_create("100.0").await.unwrap();
        registry.get_or_create("200.0").await.unwrap();

        // now such that "100.0" sits exactly at the boundary: elapsed == TTL.
        let now_ms = 100_000 + TTL_MS;
        let evicted = registry.evict_if_idle(now_ms, TTL_MS).await;
        assert!(evicted.is_empty(), "boundary elapsed == TTL must not evict");

        // One millisecond later "100.0" is past the TTL, "200.0" is not.
        let evicted = registry.evict_if_idle(now_ms + 1, TTL_MS).await;
        assert_eq!(evicted, vec!["100.0".to_string()]);
        assert_eq!(registry.size().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_id_skipped_without_damage() {
        let log = new_log();
        let (registry, _ctx) = registry(&log);

        registry.get_or_create("not-a-timestamp").await.unwrap();
        registry.get_or_create("100.0").await.unwrap();

        let evicted = registry.evict_if_idle(100_000 + TTL_MS + 1, TTL_MS).await;
        assert_eq!(evicted, vec!["100.0".to_string()]);
        // The malformed entry survives, untouched.
        assert_eq!(registry.size().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_failure_still_removes_entry() {
        let log = new_log();
        let (registry, ctx) = registry(&log);

        // Bootstrap surface for auth, then a session surface whose close fails.
        ctx.push_surface(MockSurface::new(log.clone()));
        ctx.push_surface(MockSurface::new(log.clone()).failing_close());

        registry.get_or_create("100.0").await.unwrap();
        let evicted = registry.evict_if_idle(100_000 + TTL_MS + 1, TTL_MS).await;
        assert_eq!(evicted, vec!["100.0".to_string()]);
        assert_eq!(registry.size().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_after_recreate_is_transparent() {
        let log = new_log();
        let (registry, _ctx) = registry(&log);

        let first = registry.get_or_create("100.0").await.unwrap();
        registry.remove("100.0").await;
        let second = registry.get_or_create("100.0").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.size().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_access_basis_tracks_reuse() {
        let log = new_log();
        let context = Arc::new(MockContext::new(log.clone()));
        let mut cfg = Config::default();
        cfg.app_url = "https://notebook.example/app".to_string();
        let auth = Arc::new(AuthManager::new(
            context.clone(),
            Arc::new(MemoryBlob::default()),
            Arc::new(RecordingNotifier::default()),
            &cfg,
        ));
        let registry =
            SessionRegistry::new(context, auth, &cfg.app_url, IdleBasis::LastAccess);

        let before_ms = chrono::Utc::now().timestamp_millis();
        registry.get_or_create("100.0").await.unwrap();
        // Under last-access the old thread timestamp is irrelevant; the
        // session was just created, so nothing is idle past the TTL yet.
        let evicted = registry.evict_if_idle(before_ms + TTL_MS, TTL_MS).await;
        assert!(evicted.is_empty());
        // Well past the TTL it goes.
        let evicted = registry.evict_if_idle(before_ms + TTL_MS + 60_000, TTL_MS).await;
        assert_eq!(evicted.len(), 1);
    }
}
