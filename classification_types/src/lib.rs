//! Classification Types - Level 1 Foundation Types
//!
//! Pure data structures shared by the classification engine, its store
//! adapters and its consumers (form renderer, admin console).
//!
//! ## Contents
//!
//! - Identifier newtypes (categories, subcategories, attributes, domains, values)
//! - Catalog enums (data type, governance, provenance, audit action, target type)
//! - Catalog entities and their create/patch payloads
//! - The classification mapping join entity and its target
//! - Audit log entries
//!
//! ## Rules
//!
//! 1. **NO BUSINESS LOGIC** - validation and resolution live in the engine crate
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - every type round-trips through serde as a document
//!
//! The one exception to rule 1 is [`ClassificationMapping`]: its "exactly one
//! target" shape is enforced at deserialization time, so no store row can be
//! read back with both or neither target set.

pub mod audit;
pub mod entities;
pub mod enums;
pub mod ids;
pub mod mapping;

pub use audit::AuditLogEntry;
pub use entities::*;
pub use enums::*;
pub use ids::*;
pub use mapping::*;

use thiserror::Error;

/// Errors raised while parsing or reshaping foundation types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("unknown {kind}: '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("mapping must target exactly one of category_id / subcategory_id (got {0})")]
    MappingTarget(&'static str),
}
