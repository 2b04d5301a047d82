//! In-memory `DocumentStore` for tests and embedded use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{DocumentStore, Filter};
use crate::error::{ClassificationError, Result};

/// One collection: documents by id plus creation order.
#[derive(Default)]
struct Collection {
    order: Vec<String>,
    docs: HashMap<String, Value>,
}

impl Collection {
    fn put(&mut self, id: &str, doc: Value) {
        if self.docs.insert(id.to_string(), doc).is_none() {
            self.order.push(id.to_string());
        }
    }
}

/// `RwLock`-guarded collections with optional write-fault injection.
///
/// `fail_next_writes(n)` makes the next `n` mutating calls return
/// `Internal`, which is how cascade retry and rollback paths are exercised.
pub struct InMemoryDocumentStore {
    inner: RwLock<HashMap<String, Collection>>,
    failing_writes: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            failing_writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Rows in a collection, inactive ones included.
    pub fn document_count(&self, collection: &str) -> usize {
        self.inner
            .read()
            .map(|cols| cols.get(collection).map_or(0, |c| c.docs.len()))
            .unwrap_or(0)
    }

    fn check_write(&self, op: &str, collection: &str, id: &str) -> Result<()> {
        let tripped = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            tracing::debug!(op, collection, id, "injected store failure");
            return Err(anyhow!("injected failure on {op} {collection}/{id}").into());
        }
        Ok(())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let cols = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(cols.get(collection).and_then(|c| c.docs.get(id)).cloned())
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        let cols = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let Some(col) = cols.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(col
            .order
            .iter()
            .filter_map(|id| col.docs.get(id))
            .filter(|doc| filters.iter().all(|f| f.matches(doc)))
            .cloned()
            .collect())
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.check_write("upsert", collection, id)?;
        let mut cols = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        cols.entry(collection.to_string()).or_default().put(id, doc);
        Ok(())
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.check_write("insert", collection, id)?;
        let mut cols = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let col = cols.entry(collection.to_string()).or_default();
        if col.docs.contains_key(id) {
            return Err(ClassificationError::Conflict(format!(
                "{collection}/{id} already exists"
            )));
        }
        col.put(id, doc);
        Ok(())
    }

    async fn set_active(&self, collection: &str, id: &str, active: bool) -> Result<bool> {
        self.check_write("set_active", collection, id)?;
        let mut cols = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let Some(doc) = cols.get_mut(collection).and_then(|c| c.docs.get_mut(id)) else {
            return Ok(false);
        };
        let Some(obj) = doc.as_object_mut() else {
            return Err(anyhow!("{collection}/{id} is not an object").into());
        };
        obj.insert("active".into(), Value::Bool(active));
        obj.insert("updated_at".into(), serde_json::to_value(Utc::now()).map_err(anyhow::Error::from)?);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn query_preserves_creation_order_across_upserts() {
        let store = InMemoryDocumentStore::new();
        store.upsert("c", "b", json!({"n": 1})).await.unwrap();
        store.upsert("c", "a", json!({"n": 2})).await.unwrap();
        store.upsert("c", "b", json!({"n": 3})).await.unwrap();

        let docs = store.query("c", &[]).await.unwrap();
        assert_eq!(docs, vec![json!({"n": 3}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn insert_conflicts_on_existing_id() {
        let store = InMemoryDocumentStore::new();
        store.insert("c", "x", json!({})).await.unwrap();
        let err = store.insert("c", "x", json!({})).await.unwrap_err();
        assert!(matches!(err, ClassificationError::Conflict(_)));
    }

    #[tokio::test]
    async fn set_active_unknown_id_returns_false() {
        let store = InMemoryDocumentStore::new();
        assert!(!store.set_active("c", "missing", false).await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryDocumentStore::new();
        store.fail_next_writes(2);
        assert!(store.upsert("c", "x", json!({})).await.is_err());
        assert!(store.upsert("c", "x", json!({})).await.is_err());
        store.upsert("c", "x", json!({})).await.unwrap();
        assert_eq!(store.document_count("c"), 1);
    }

    #[tokio::test]
    async fn reads_are_unaffected_by_injected_failures() {
        let store = InMemoryDocumentStore::new();
        store.upsert("c", "x", json!({"active": true})).await.unwrap();
        store.fail_next_writes(1);
        assert!(store.get("c", "x").await.unwrap().is_some());
        assert_eq!(store.query("c", &[Filter::eq("active", true)]).await.unwrap().len(), 1);
    }
}
