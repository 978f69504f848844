use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;

/// Key-value store for out-of-line outbox payloads.
///
/// Keys are flat strings (the queue uses `outbox_<id>`); values are JSON
/// documents. Implementations must be safe to share across tasks.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Fetch the value stored under `key`, or `None` if absent.
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Store `value` under `key`, replacing any existing value.
    async fn set_item(&self, key: &str, value: &Value) -> StorageResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// List every key currently present.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Whether `key` is present.
    async fn has_item(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get_item(key).await?.is_some())
    }
}
