//! Catalog enums.

// Enums use `from_str() -> Option<Self>`-style parsing through `parse()`
// returning `TypeError`, matching how admin forms submit raw strings.
#![allow(clippy::should_implement_trait)]

use serde::{Deserialize, Serialize};

use crate::TypeError;

/// Primitive data type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Text,
    Number,
    Boolean,
    /// Value drawn from a governed domain. Requires `Attribute::domain_id`.
    List,
    Range,
    Date,
}

impl DataType {
    pub const ALL: [DataType; 6] = [
        Self::Text,
        Self::Number,
        Self::Boolean,
        Self::List,
        Self::Range,
        Self::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
            Self::List => "LIST",
            Self::Range => "RANGE",
            Self::Date => "DATE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypeError::UnknownVariant {
                kind: "data type",
                value: s.to_string(),
            })
    }

    pub fn requires_domain(&self) -> bool {
        matches!(self, Self::List)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may extend a domain's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Governance {
    /// Only privileged actors add values.
    Closed,
    /// Any actor adds values, provided a justification is given.
    SemiClosed,
}

impl Governance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::SemiClosed => "SEMI_CLOSED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLOSED" => Ok(Self::Closed),
            "SEMI_CLOSED" => Ok(Self::SemiClosed),
            _ => Err(TypeError::UnknownVariant {
                kind: "governance",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Governance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a domain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Normative,
    /// Requires a non-empty justification.
    UserAdded,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normative => "NORMATIVE",
            Self::UserAdded => "USER_ADDED",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Delete,
    Update,
    Reorder,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Update => "UPDATE",
            Self::Reorder => "REORDER",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Taxonomy level a mapping (or audit entry) is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Category,
    Subcategory,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Subcategory => "subcategory",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        match s.trim() {
            "category" => Ok(Self::Category),
            "subcategory" => Ok(Self::Subcategory),
            _ => Err(TypeError::UnknownVariant {
                kind: "target type",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
