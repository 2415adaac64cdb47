// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple, fast state store that doesn't persist across restarts.
// Useful for tests and for embedding the reconciler in a process that owns
// its own persistence.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - Resources created before the crash become unmanaged (they still exist
//   remotely and must be imported or cleaned up by hand)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::IpResourceState;
use crate::traits::state_store::StateStore;

/// In-memory state store implementation
///
/// This implementation stores all state in a HashMap protected by a RwLock.
/// It provides no persistence across restarts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<String, IpResourceState>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of resources in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Clear all resources from the store
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, name: &str) -> Result<Option<IpResourceState>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(name).cloned())
    }

    async fn put(&self, name: &str, state: &IpResourceState) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(name.to_string(), state.clone());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use crate::traits::linode_api::IpAddressRecord;

    fn state(address: &str) -> IpResourceState {
        IpResourceState::from_record(
            ResourceKind::Reserved,
            &IpAddressRecord {
                address: address.to_string(),
                gateway: None,
                subnet_mask: None,
                prefix: None,
                ip_type: "ipv4".to_string(),
                public: true,
                rdns: None,
                linode_id: None,
                region: Some("us-east".to_string()),
                reserved: true,
            },
        )
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty().await);

        store.put("web", &state("192.0.2.10")).await.unwrap();
        assert_eq!(store.len().await, 1);

        let retrieved = store.get("web").await.unwrap().unwrap();
        assert_eq!(retrieved.address, "192.0.2.10");

        store.remove("web").await.unwrap();
        assert!(store.get("web").await.unwrap().is_none());

        // removing twice is fine
        store.remove("web").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_list_is_sorted() {
        let store = MemoryStateStore::new();
        store.put("b", &state("192.0.2.11")).await.unwrap();
        store.put("a", &state("192.0.2.10")).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["a", "b"]);

        store.clear().await;
        assert!(store.is_empty().await);
    }
}
