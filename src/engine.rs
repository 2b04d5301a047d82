//! Engine facade wiring the catalogs, registry, resolver and audit trail over
//! one document store and one audit store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use classification_types::{AttributeId, AuditLogEntry, CategoryId, EffectiveAttribute, SubcategoryId};

use crate::attributes::AttributeCatalog;
use crate::audit::{AuditStore, AuditTrail, InMemoryAuditStore};
use crate::config::EngineConfig;
use crate::domains::DomainCatalog;
use crate::error::Result;
use crate::mappings::Resolver;
use crate::principal::Actor;
use crate::seeds::{self, BootstrapReport, SeedBundle};
use crate::store::{DocumentStore, InMemoryDocumentStore};
use crate::taxonomy::Registry;
use crate::values::{ValidatedItem, ValueValidator};

#[derive(Clone)]
pub struct ClassificationEngine {
    pub domains: DomainCatalog,
    pub attributes: AttributeCatalog,
    pub registry: Registry,
    pub resolver: Resolver,
    pub audit: AuditTrail,
    store: Arc<dyn DocumentStore>,
    config: Arc<EngineConfig>,
}

impl ClassificationEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit_store: Arc<dyn AuditStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let audit = AuditTrail::new(audit_store);
        let resolver = Resolver::new(Arc::clone(&store), audit.clone(), Arc::clone(&config));
        Ok(Self {
            domains: DomainCatalog::new(Arc::clone(&store), Arc::clone(&config)),
            attributes: AttributeCatalog::new(Arc::clone(&store), resolver.clone()),
            registry: Registry::new(Arc::clone(&store)),
            resolver,
            audit,
            store,
            config,
        })
    }

    /// Engine over fresh in-memory stores with default configuration.
    pub fn in_memory() -> Self {
        let config = Arc::new(EngineConfig::default());
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let audit = AuditTrail::new(Arc::new(InMemoryAuditStore::new()));
        let resolver = Resolver::new(Arc::clone(&store), audit.clone(), Arc::clone(&config));
        Self {
            domains: DomainCatalog::new(Arc::clone(&store), Arc::clone(&config)),
            attributes: AttributeCatalog::new(Arc::clone(&store), resolver.clone()),
            registry: Registry::new(Arc::clone(&store)),
            resolver,
            audit,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validator(&self) -> ValueValidator {
        ValueValidator::new(self.resolver.clone(), self.attributes.clone(), self.domains.clone())
    }

    /// Load a seed bundle. Rows whose id already exists are skipped.
    pub async fn bootstrap(&self, bundle: &SeedBundle) -> Result<BootstrapReport> {
        seeds::apply(bundle, Arc::clone(&self.store), &self.audit, &Actor::system()).await
    }

    // Shorthands for the two consumer-facing reads.

    pub async fn get_effective_attributes(
        &self,
        category_id: Option<&CategoryId>,
        subcategory_id: Option<&SubcategoryId>,
    ) -> Result<Vec<EffectiveAttribute>> {
        self.resolver
            .get_effective_attributes(category_id, subcategory_id)
            .await
    }

    pub async fn get_logs(&self, target_id: &str) -> Result<Vec<AuditLogEntry>> {
        self.audit.get_logs(target_id).await
    }

    pub async fn validate_item(
        &self,
        category_id: Option<&CategoryId>,
        subcategory_id: Option<&SubcategoryId>,
        values: &BTreeMap<AttributeId, Value>,
    ) -> Result<ValidatedItem> {
        self.validator()
            .validate_item(category_id, subcategory_id, values)
            .await
    }
}
