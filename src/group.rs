//! Per-metric group index
//!
//! Every value key a metric writes is also added to the set at
//! `{metric_name}_group`, in the same batch as the value write. Collection
//! walks this set instead of scanning the keyspace.

use crate::error::StoreError;
use crate::store::{Batch, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIndex {
    key: String,
}

impl GroupIndex {
    pub fn for_metric(name: &str) -> Self {
        Self {
            key: format!("{}_group", name),
        }
    }

    /// Store key of the index set.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append the registration of `keys` to a batch. Re-registering a known
    /// key is a no-op, so batches can be retried safely.
    pub fn register(&self, batch: Batch, keys: Vec<String>) -> Batch {
        batch.sadd(self.key.clone(), keys)
    }

    /// Append removal of `keys` from the index to a batch.
    pub fn unregister(&self, batch: Batch, keys: Vec<String>) -> Batch {
        batch.srem(self.key.clone(), keys)
    }

    pub async fn members(&self, store: &dyn Store) -> Result<Vec<String>, StoreError> {
        store.smembers(&self.key).await
    }

    /// Drop members whose value no longer exists.
    pub async fn prune(&self, store: &dyn Store, keys: Vec<String>) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        tracing::debug!(group = %self.key, count = keys.len(), "pruning expired group members");
        store.execute(self.unregister(Batch::new(), keys)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_group_key() {
        assert_eq!(GroupIndex::for_metric("requests").key(), "requests_group");
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = MemoryStore::new();
        let group = GroupIndex::for_metric("m");
        for _ in 0..3 {
            let batch = group.register(Batch::new(), vec!["m:a".to_string()]);
            store.execute(batch).await.unwrap();
        }
        assert_eq!(group.members(&store).await.unwrap(), vec!["m:a"]);
    }

    #[tokio::test]
    async fn test_prune() {
        let store = MemoryStore::new();
        let group = GroupIndex::for_metric("m");
        let batch = group.register(Batch::new(), vec!["m:a".to_string(), "m:b".to_string()]);
        store.execute(batch).await.unwrap();

        group.prune(&store, vec!["m:a".to_string()]).await.unwrap();
        assert_eq!(group.members(&store).await.unwrap(), vec!["m:b"]);

        group.prune(&store, Vec::new()).await.unwrap();
        assert_eq!(group.members(&store).await.unwrap(), vec!["m:b"]);
    }
}
