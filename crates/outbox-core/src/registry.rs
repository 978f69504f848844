use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::outbox::Outbox;

/// Named outboxes, one per service a host talks to. Explicitly constructed
/// and passed around; there is no global instance.
#[derive(Default)]
pub struct OutboxRegistry {
    outboxes: RwLock<HashMap<String, Arc<Outbox>>>,
}

impl OutboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Outbox>> {
        self.outboxes.read().await.get(name).cloned()
    }

    /// Fetch the named outbox, creating it with `create` on first use.
    pub async fn get_or_create<F>(&self, name: &str, create: F) -> Arc<Outbox>
    where
        F: FnOnce() -> Arc<Outbox>,
    {
        if let Some(existing) = self.outboxes.read().await.get(name) {
            return Arc::clone(existing);
        }
        let mut outboxes = self.outboxes.write().await;
        // Re-check: another task may have created it between locks.
        if let Some(existing) = outboxes.get(name) {
            return Arc::clone(existing);
        }
        debug!(name, "Creating outbox");
        let outbox = create();
        outboxes.insert(name.to_string(), Arc::clone(&outbox));
        outbox
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<Outbox>> {
        self.outboxes.write().await.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutboxConfig;
    use outbox_storage::MemoryStore;
    use outbox_transport::{HttpTransport, HttpTransportConfig};

    fn make_outbox() -> Arc<Outbox> {
        let store = Arc::new(MemoryStore::new());
        let transport =
            Arc::new(HttpTransport::new(HttpTransportConfig::default()).unwrap());
        Arc::new(Outbox::new(
            OutboxConfig::new("https://example.com"),
            store,
            transport,
        ))
    }

    #[tokio::test]
    async fn get_or_create_returns_same_instance() {
        let registry = OutboxRegistry::new();
        let first = registry.get_or_create("main", make_outbox).await;
        let second = registry.get_or_create("main", make_outbox).await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn names_are_independent() {
        let registry = OutboxRegistry::new();
        let a = registry.get_or_create("a", make_outbox).await;
        let b = registry.get_or_create("b", make_outbox).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(registry.get("a").await.is_some());
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn remove_forgets_the_outbox() {
        let registry = OutboxRegistry::new();
        registry.get_or_create("a", make_outbox).await;
        assert!(registry.remove("a").await.is_some());
        assert!(registry.get("a").await.is_none());
    }
}
