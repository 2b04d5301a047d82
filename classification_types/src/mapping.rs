//! Classification mapping: the join between an attribute and a taxonomy node.

use std::convert::TryFrom;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::TargetType;
use crate::ids::{AttributeId, CategoryId, SubcategoryId};
use crate::TypeError;

/// The single taxonomy node a mapping is attached to.
///
/// Modelled as an enum so "both" and "neither" are unrepresentable in memory;
/// the document shape (`category_id` / `subcategory_id`) is validated on read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MappingTarget {
    Category(CategoryId),
    Subcategory(SubcategoryId),
}

impl MappingTarget {
    pub fn from_parts(target_type: TargetType, id: impl Into<String>) -> Self {
        match target_type {
            TargetType::Category => Self::Category(CategoryId::new(id)),
            TargetType::Subcategory => Self::Subcategory(SubcategoryId::new(id)),
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Self::Category(_) => TargetType::Category,
            Self::Subcategory(_) => TargetType::Subcategory,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Category(id) => id.as_str(),
            Self::Subcategory(id) => id.as_str(),
        }
    }

    /// Name of the document field holding this target's id.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Category(_) => "category_id",
            Self::Subcategory(_) => "subcategory_id",
        }
    }
}

impl std::fmt::Display for MappingTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.target_type(), self.id())
    }
}

impl From<CategoryId> for MappingTarget {
    fn from(id: CategoryId) -> Self {
        Self::Category(id)
    }
}

impl From<SubcategoryId> for MappingTarget {
    fn from(id: SubcategoryId) -> Self {
        Self::Subcategory(id)
    }
}

/// Deterministic mapping key: `<target_type>:<target_id>:<attribute_id>`.
///
/// Concurrent "add" calls for the same triple write the same document id and
/// therefore converge on one row. `%` and `:` inside ids are percent-escaped so
/// distinct triples never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingKey(String);

impl MappingKey {
    pub fn new(target: &MappingTarget, attribute_id: &AttributeId) -> Self {
        Self(format!(
            "{}:{}:{}",
            target.target_type(),
            escape_key_part(target.id()),
            escape_key_part(attribute_id.as_str())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_key_part(part: &str) -> std::borrow::Cow<'_, str> {
    if part.contains(['%', ':']) {
        part.replace('%', "%25").replace(':', "%3A").into()
    } else {
        part.into()
    }
}

impl std::fmt::Display for MappingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MappingRecord", into = "MappingRecord")]
pub struct ClassificationMapping {
    pub id: MappingKey,
    pub target: MappingTarget,
    pub attribute_id: AttributeId,
    pub is_mandatory: bool,
    pub sort_order: u32,
    /// Detached mappings stay in the store with `active = false`.
    pub active: bool,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl ClassificationMapping {
    pub fn new(
        target: MappingTarget,
        attribute_id: AttributeId,
        sort_order: u32,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: MappingKey::new(&target, &attribute_id),
            target,
            attribute_id,
            is_mandatory: false,
            sort_order,
            active: true,
            updated_at: Utc::now(),
            updated_by: actor.into(),
        }
    }

    pub fn category_id(&self) -> Option<&CategoryId> {
        match &self.target {
            MappingTarget::Category(id) => Some(id),
            MappingTarget::Subcategory(_) => None,
        }
    }

    pub fn subcategory_id(&self) -> Option<&SubcategoryId> {
        match &self.target {
            MappingTarget::Subcategory(id) => Some(id),
            MappingTarget::Category(_) => None,
        }
    }
}

/// Document shape of a mapping row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingRecord {
    id: MappingKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subcategory_id: Option<SubcategoryId>,
    attribute_id: AttributeId,
    #[serde(default)]
    is_mandatory: bool,
    #[serde(default)]
    sort_order: u32,
    #[serde(default = "default_active")]
    active: bool,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    updated_by: String,
}

fn default_active() -> bool {
    true
}

impl TryFrom<MappingRecord> for ClassificationMapping {
    type Error = TypeError;

    fn try_from(rec: MappingRecord) -> Result<Self, Self::Error> {
        // Legacy rows store "" for the unused side.
        let category = rec.category_id.filter(|id| !id.is_empty());
        let subcategory = rec.subcategory_id.filter(|id| !id.is_empty());
        let target = match (category, subcategory) {
            (Some(c), None) => MappingTarget::Category(c),
            (None, Some(s)) => MappingTarget::Subcategory(s),
            (Some(_), Some(_)) => return Err(TypeError::MappingTarget("both")),
            (None, None) => return Err(TypeError::MappingTarget("neither")),
        };
        Ok(Self {
            id: rec.id,
            target,
            attribute_id: rec.attribute_id,
            is_mandatory: rec.is_mandatory,
            sort_order: rec.sort_order,
            active: rec.active,
            updated_at: rec.updated_at,
            updated_by: rec.updated_by,
        })
    }
}

impl From<ClassificationMapping> for MappingRecord {
    fn from(m: ClassificationMapping) -> Self {
        let (category_id, subcategory_id) = match m.target {
            MappingTarget::Category(c) => (Some(c), None),
            MappingTarget::Subcategory(s) => (None, Some(s)),
        };
        Self {
            id: m.id,
            category_id,
            subcategory_id,
            attribute_id: m.attribute_id,
            is_mandatory: m.is_mandatory,
            sort_order: m.sort_order,
            active: m.active,
            updated_at: m.updated_at,
            updated_by: m.updated_by,
        }
    }
}

/// One entry of a resolved attribute set, as handed to the form renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveAttribute {
    pub mapping: ClassificationMapping,
    /// True when the entry comes only from the owning category.
    pub is_inherited: bool,
}

impl EffectiveAttribute {
    pub fn attribute_id(&self) -> &AttributeId {
        &self.mapping.attribute_id
    }

    pub fn is_mandatory(&self) -> bool {
        self.mapping.is_mandatory
    }

    pub fn sort_order(&self) -> u32 {
        self.mapping.sort_order
    }
}
