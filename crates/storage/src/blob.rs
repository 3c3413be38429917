use async_trait::async_trait;
use notebridge_core::{Error, Result};
use std::path::PathBuf;
use tracing::debug;

/// Fixed key holding the serialized authentication state of the shared
/// browsing context. Read at bootstrap, written after a verified login.
pub const AUTH_STATE_KEY: &str = "auth/state.json";

/// Key-addressed blob storage. One fixed key carries the persisted auth
/// state; caller-supplied keys carry debug screenshots and HTML dumps.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` when the key does not exist; absence is not an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a blob and return a URI usable in operator notifications.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Filesystem-backed store rooted at the configured blob directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are slash-separated prefixes ("screenshot/auth.png");
        // anything that escapes the root is rejected.
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(Error::Storage(format!("invalid blob key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read {key}: {e}"))),
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("mkdir for {key}: {e}")))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| Error::Storage(format!("write {key}: {e}")))?;
        debug!(key = %key, bytes = body.len(), content_type = %content_type, "Stored blob");
        Ok(format!("file://{}", path.display()))
    }
}
