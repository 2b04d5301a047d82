//! Storage port for the catalog: a collection-scoped document store.
//!
//! Core logic depends only on [`DocumentStore`]; the in-memory adapter in
//! [`memory`] satisfies the same contract for tests and embedded use.
//!
//! Contract:
//! - documents are JSON objects addressed by `(collection, id)`
//! - `query` applies equality filters on top-level fields and returns
//!   documents in creation order
//! - nothing is ever physically removed; `set_active(false)` is the only delete

pub mod memory;

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use classification_types::{
    Attribute, Category, ClassificationMapping, Domain, DomainValue, Subcategory,
};

use crate::error::{ClassificationError, Result};

pub use memory::InMemoryDocumentStore;

/// Equality filter on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        doc.get(&self.field) == Some(&self.value)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Value>>;

    /// Create or fully replace the document.
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Create the document; `Conflict` if the id is already taken.
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Flip the `active` flag and stamp `updated_at`. Returns false when the id is unknown.
    async fn set_active(&self, collection: &str, id: &str, active: bool) -> Result<bool>;
}

/// A typed row stored in a [`DocumentStore`] collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human-readable kind used in error messages.
    const KIND: &'static str;

    fn doc_id(&self) -> &str;
    fn is_active(&self) -> bool;
}

impl Document for Category {
    const COLLECTION: &'static str = "categories";
    const KIND: &'static str = "category";

    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
    fn is_active(&self) -> bool {
        self.active
    }
}

impl Document for Subcategory {
    const COLLECTION: &'static str = "subcategories";
    const KIND: &'static str = "subcategory";

    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
    fn is_active(&self) -> bool {
        self.active
    }
}

impl Document for Attribute {
    const COLLECTION: &'static str = "attributes";
    const KIND: &'static str = "attribute";

    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
    fn is_active(&self) -> bool {
        self.active
    }
}

impl Document for Domain {
    const COLLECTION: &'static str = "domains";
    const KIND: &'static str = "domain";

    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
    fn is_active(&self) -> bool {
        self.active
    }
}

impl Document for DomainValue {
    const COLLECTION: &'static str = "domain_values";
    const KIND: &'static str = "domain value";

    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
    fn is_active(&self) -> bool {
        self.active
    }
}

impl Document for ClassificationMapping {
    const COLLECTION: &'static str = "classification_mappings";
    const KIND: &'static str = "mapping";

    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
    fn is_active(&self) -> bool {
        self.active
    }
}

/// Typed view over one collection of a [`DocumentStore`].
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _doc: PhantomData,
        }
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _doc: PhantomData,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(decode::<T>)
            .transpose()
    }

    pub async fn get_active(&self, id: &str) -> Result<Option<T>> {
        Ok(self.get(id).await?.filter(|doc| doc.is_active()))
    }

    /// Active document or `NotFound`.
    pub async fn require_active(&self, id: &str) -> Result<T> {
        self.get_active(id)
            .await?
            .ok_or_else(|| ClassificationError::not_found(T::KIND, id))
    }

    pub async fn query(&self, filters: &[Filter]) -> Result<Vec<T>> {
        self.store
            .query(T::COLLECTION, filters)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    pub async fn query_active(&self, filters: &[Filter]) -> Result<Vec<T>> {
        let mut filters = filters.to_vec();
        filters.push(Filter::eq("active", true));
        self.query(&filters).await
    }

    pub async fn upsert(&self, doc: &T) -> Result<()> {
        self.store
            .upsert(T::COLLECTION, doc.doc_id(), encode(doc)?)
            .await
    }

    pub async fn insert(&self, doc: &T) -> Result<()> {
        self.store
            .insert(T::COLLECTION, doc.doc_id(), encode(doc)?)
            .await
    }

    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        self.store.set_active(T::COLLECTION, id, false).await
    }
}

fn encode<T: Document>(doc: &T) -> Result<Value> {
    serde_json::to_value(doc)
        .map_err(|e| anyhow!("encoding {} '{}': {}", T::KIND, doc.doc_id(), e).into())
}

fn decode<T: Document>(doc: Value) -> Result<T> {
    serde_json::from_value(doc)
        .map_err(|e| anyhow!("corrupt {} document in '{}': {}", T::KIND, T::COLLECTION, e).into())
}
