use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{Result, Retrieved, SampleStore, StorageError};

/// In-memory record store using BTreeMap
///
/// Reads report zero hops: the record is always local.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.data.read().await.contains_key(key)
    }

    /// Keys starting with `prefix`, in sorted order
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.data
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.data.write().await.clear();
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Retrieved> {
        self.data
            .read()
            .await
            .get(key)
            .cloned()
            .map(|value| Retrieved { value, hops: 0 })
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }
}
