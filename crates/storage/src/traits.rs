use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::Result;

/// Value returned by a successful read, with the routing distance it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub value: Bytes,
    pub hops: u32,
}

/// Key/value store the sampling engines publish to and fetch from
///
/// Implementations may be slow or fail; callers treat every error as soft.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Put a value under `key`
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Get the value stored under `key`
    async fn get(&self, key: &str) -> Result<Retrieved>;

    /// Opportunistically populate routing state before first use.
    ///
    /// Returns the number of peers added. Not required for correctness.
    async fn seed_routing(&self) -> usize {
        0
    }
}

#[async_trait]
impl<T: SampleStore + ?Sized> SampleStore for Arc<T> {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        (**self).put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Retrieved> {
        (**self).get(key).await
    }

    async fn seed_routing(&self) -> usize {
        (**self).seed_routing().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    // Mock implementation for testing the provided methods
    struct RejectingStore;

    #[async_trait]
    impl SampleStore for RejectingStore {
        async fn put(&self, _key: &str, _value: Bytes) -> Result<()> {
            Err(StorageError::Unavailable("rejecting".to_string()))
        }

        async fn get(&self, key: &str) -> Result<Retrieved> {
            Err(StorageError::KeyNotFound(key.to_string()))
        }
    }

    #[tokio::test]
    async fn test_default_seed_routing_is_noop() {
        let store = Arc::new(RejectingStore);
        assert_eq!(store.seed_routing().await, 0);
        assert!(store.put("k", Bytes::new()).await.is_err());
        assert!(matches!(
            store.get("k").await,
            Err(StorageError::KeyNotFound(_))
        ));
    }
}
