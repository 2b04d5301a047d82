//! Append-only audit log entry for mapping mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{AuditAction, TargetType};
use crate::ids::AuditEntryId;
use crate::mapping::MappingTarget;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub target_type: TargetType,
    pub target_id: String,
    pub details: String,
}

impl AuditLogEntry {
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        target: &MappingTarget,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditEntryId::generate(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            target_type: target.target_type(),
            target_id: target.id().to_string(),
            details: details.into(),
        }
    }
}
