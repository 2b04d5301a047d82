//! Catalog and taxonomy entities, plus their create/patch payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{DataType, Governance, Provenance};
use crate::ids::{AttributeId, CategoryId, DomainId, DomainValueId, SubcategoryId};

// ============================================================================
// TAXONOMY
// ============================================================================

/// Root taxonomy node (Anillos, Pendientes, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Leaf taxonomy node, owned by exactly one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    pub id: SubcategoryId,
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubcategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Re-parent the subcategory under another active category.
    pub category_id: Option<CategoryId>,
}

// ============================================================================
// ATTRIBUTES
// ============================================================================

/// Global, reusable field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub data_type: DataType,
    /// Present iff `data_type == LIST`.
    #[serde(default)]
    pub domain_id: Option<DomainId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttribute {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub data_type: DataType,
    #[serde(default)]
    pub domain_id: Option<DomainId>,
}

impl NewAttribute {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            description: None,
            data_type,
            domain_id: None,
        }
    }

    pub fn with_domain(mut self, domain_id: impl Into<DomainId>) -> Self {
        self.domain_id = Some(domain_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub data_type: Option<DataType>,
    pub domain_id: Option<DomainId>,
}

// ============================================================================
// DOMAINS
// ============================================================================

/// Governed vocabulary container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    /// Stable identifier (MATERIAL, COLOR_METAL).
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub governance: Governance,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDomain {
    /// Derived from `name` when absent.
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub governance: Governance,
}

impl NewDomain {
    pub fn new(name: impl Into<String>, governance: Governance) -> Self {
        Self {
            code: None,
            name: name.into(),
            description: None,
            governance,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub governance: Option<Governance>,
}

/// One permissible value within a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainValue {
    pub id: DomainValueId,
    pub domain_id: DomainId,
    pub value: String,
    pub sort_order: i32,
    pub provenance: Provenance,
    /// Required iff `provenance == USER_ADDED`.
    #[serde(default)]
    pub justification: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDomainValue {
    pub domain_id: DomainId,
    pub value: String,
    #[serde(default)]
    pub sort_order: i32,
    pub provenance: Provenance,
    #[serde(default)]
    pub justification: Option<String>,
}

impl NewDomainValue {
    pub fn normative(domain_id: impl Into<DomainId>, value: impl Into<String>, sort_order: i32) -> Self {
        Self {
            domain_id: domain_id.into(),
            value: value.into(),
            sort_order,
            provenance: Provenance::Normative,
            justification: None,
        }
    }

    pub fn user_added(
        domain_id: impl Into<DomainId>,
        value: impl Into<String>,
        sort_order: i32,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            domain_id: domain_id.into(),
            value: value.into(),
            sort_order,
            provenance: Provenance::UserAdded,
            justification: Some(justification.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainValuePatch {
    pub value: Option<String>,
    pub sort_order: Option<i32>,
    pub provenance: Option<Provenance>,
    pub justification: Option<String>,
}
