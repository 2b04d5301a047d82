//! Jewelry Classification Engine
//!
//! Decides which descriptive attributes a jewelry item carries, per category
//! and subcategory, with two-level inheritance and governed vocabularies.
//!
//! # Architecture
//!
//! ```text
//! DomainCatalog ──┐
//!                 ├──► Resolver ──► AuditTrail
//! AttributeCatalog┘        ▲
//!        │                 │
//!        └── cascade ──────┘
//! Registry (categories / subcategories) ──► Resolver
//!
//! every component ──► DocumentStore (port) ──► InMemoryDocumentStore
//! ```
//!
//! [`ClassificationEngine`] wires everything over one store. Form renderers
//! call [`ClassificationEngine::get_effective_attributes`]; admin consoles
//! drive the catalog and mapping mutations and read
//! [`ClassificationEngine::get_logs`].

pub mod attributes;
pub mod audit;
pub mod config;
pub mod domains;
pub mod engine;
pub mod error;
pub mod mappings;
pub mod principal;
pub mod seeds;
pub mod store;
pub mod taxonomy;
pub mod telemetry;
pub mod values;

pub use attributes::AttributeCatalog;
pub use audit::{AuditStore, AuditTrail, InMemoryAuditStore};
pub use config::EngineConfig;
pub use domains::DomainCatalog;
pub use engine::ClassificationEngine;
pub use error::{ClassificationError, Result};
pub use mappings::{ChangeScope, MappingChange, Resolver, TargetLocks};
pub use principal::Actor;
pub use seeds::{BootstrapReport, SeedBundle};
pub use store::{DocumentStore, Filter, InMemoryDocumentStore, Repository};
pub use taxonomy::Registry;
pub use values::{AttributeValue, IssueKind, ValidatedItem, ValueIssue, ValueValidator};

pub use classification_types;
