//! Audit trail for mapping mutations.
//!
//! Entries are written by mapping mutations and seeding, and are never updated or
//! removed; the port has no such methods.

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;

use classification_types::{AuditAction, AuditLogEntry, MappingTarget};

use crate::error::Result;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Entries for `target_id`, in append order.
    async fn list_for_target(&self, target_id: &str) -> Result<Vec<AuditLogEntry>>;
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| anyhow!("Lock: {}", e))?;
        entries.push(entry.clone());
        Ok(())
    }

    async fn list_for_target(&self, target_id: &str) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(entries
            .iter()
            .filter(|e| e.target_id == target_id)
            .cloned()
            .collect())
    }
}

/// Read/append facade over an [`AuditStore`].
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn record(
        &self,
        actor: &str,
        action: AuditAction,
        target: &MappingTarget,
        details: impl Into<String>,
    ) -> Result<AuditLogEntry> {
        let entry = AuditLogEntry::new(actor, action, target, details);
        self.store.append(&entry).await?;
        tracing::debug!(
            target_id = %entry.target_id,
            action = %entry.action,
            actor = %entry.actor,
            "audit entry appended"
        );
        Ok(entry)
    }

    /// All entries for a target, newest first.
    ///
    /// Entries sharing a timestamp come out in reverse append order.
    pub async fn get_logs(&self, target_id: &str) -> Result<Vec<AuditLogEntry>> {
        let mut logs = self.store.list_for_target(target_id).await?;
        logs.reverse();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(logs)
    }
}
