//! Local storage boundary.
//!
//! The coordinator treats local storage as a dumb upsert target keyed by
//! entity kind and id. No transactions are required across collections.

use crate::error::SyncResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tasknest_sync_protocol::EntityKind;

/// Async key-value/document store for task entities plus a small metadata
/// keyspace for persisted sync state.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Creates or replaces an entity.
    async fn upsert(&self, kind: EntityKind, entity_id: &str, data: Value) -> SyncResult<()>;

    /// Removes an entity. Removing a missing entity is not an error.
    async fn remove(&self, kind: EntityKind, entity_id: &str) -> SyncResult<()>;

    /// Reads a metadata value.
    async fn get_meta(&self, key: &str) -> SyncResult<Option<String>>;

    /// Writes a metadata value.
    async fn put_meta(&self, key: &str, value: String) -> SyncResult<()>;
}

/// An in-memory store for tests and development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<(EntityKind, String), Value>>,
    meta: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an entity's payload, if present.
    pub fn get(&self, kind: EntityKind, entity_id: &str) -> Option<Value> {
        self.entities
            .read()
            .get(&(kind, entity_id.to_string()))
            .cloned()
    }

    /// Number of entities in a collection.
    pub fn collection_len(&self, kind: EntityKind) -> usize {
        self.entities
            .read()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn upsert(&self, kind: EntityKind, entity_id: &str, data: Value) -> SyncResult<()> {
        self.entities
            .write()
            .insert((kind, entity_id.to_string()), data);
        Ok(())
    }

    async fn remove(&self, kind: EntityKind, entity_id: &str) -> SyncResult<()> {
        self.entities
            .write()
            .remove(&(kind, entity_id.to_string()));
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.meta.read().get(key).cloned())
    }

    async fn put_meta(&self, key: &str, value: String) -> SyncResult<()> {
        self.meta.write().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_and_remove() {
        let store = MemoryStore::new();

        store
            .upsert(EntityKind::Action, "a1", json!({"title": "T"}))
            .await
            .unwrap();
        assert_eq!(
            store.get(EntityKind::Action, "a1").unwrap()["title"],
            json!("T")
        );

        store
            .upsert(EntityKind::Action, "a1", json!({"title": "U"}))
            .await
            .unwrap();
        assert_eq!(store.collection_len(EntityKind::Action), 1);

        store.remove(EntityKind::Action, "a1").await.unwrap();
        assert!(store.get(EntityKind::Action, "a1").is_none());

        // Removing again is a no-op.
        store.remove(EntityKind::Action, "a1").await.unwrap();
    }

    #[tokio::test]
    async fn meta_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_meta("sync_state").await.unwrap().is_none());

        store
            .put_meta("sync_state", "{\"status\":\"idle\"}".into())
            .await
            .unwrap();
        assert!(store.get_meta("sync_state").await.unwrap().is_some());
    }
}
