use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StorageResult;
use crate::traits::PayloadStore;

/// In-memory `PayloadStore`. Contents do not survive the process; useful for
/// tests and for hosts that persist outbox state themselves.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayloadStore for MemoryStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.items.lock().await.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.items.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.items.lock().await.keys().cloned().collect())
    }
}
