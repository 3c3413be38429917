pub mod auth;
pub mod query;
pub mod reaper;
pub mod registry;
pub mod session;

pub use auth::AuthManager;
pub use query::{QueryExecutor, TIMEOUT_SENTINEL};
pub use reaper::SessionReaper;
pub use registry::SessionRegistry;
pub use session::{parse_epoch_seconds, Session};

#[cfg(test)]
pub(crate) mod testutil {
    use async_trait::async_trait;
    use notebridge_core::{Notification, Result};
    use notebridge_channels::Notifier;
    use notebridge_storage::BlobStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory blob store.
    #[derive(Default)]
    pub struct MemoryBlob {
        pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryBlob {
        pub fn with(key: &str, body: &[u8]) -> Self {
            let store = Self::default();
            store.blobs.lock().unwrap().insert(key.to_string(), body.to_vec());
            store
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlob {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.blobs.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<String> {
            self.blobs.lock().unwrap().insert(key.to_string(), body);
            Ok(format!("mem://{key}"))
        }
    }

    /// Notifier that records every payload.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }
}
