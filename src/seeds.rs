//! Canonical, hashable bootstrap payload for the catalog.
//!
//! A bundle is self-contained: every id it references (parent category,
//! attribute domain, mapping target) must be defined in the same bundle.
//! Applying a bundle inserts rows with their given ids and skips any id that
//! already exists, so re-applying is a no-op.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use classification_types::{
    Attribute, AttributeId, AuditAction, Category, CategoryId, ClassificationMapping, DataType,
    Domain, DomainId, DomainValue, DomainValueId, Governance, MappingTarget, Provenance,
    Subcategory, SubcategoryId,
};

use crate::audit::AuditTrail;
use crate::error::{ClassificationError, Result};
use crate::principal::Actor;
use crate::store::{Document, DocumentStore, Repository};

const BUILTIN_JEWELRY: &str = include_str!("../seeds/jewelry.yaml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedBundle {
    /// `v1:` + SHA-256 of the canonical JSON of the bundle contents.
    /// Filled by `from_yaml_str` when absent.
    #[serde(default)]
    pub bundle_hash: String,
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub subcategories: Vec<SubcategorySeed>,
    #[serde(default)]
    pub domains: Vec<DomainSeed>,
    #[serde(default)]
    pub domain_values: Vec<DomainValueSeed>,
    #[serde(default)]
    pub attributes: Vec<AttributeSeed>,
    #[serde(default)]
    pub mappings: Vec<MappingSeed>,
}

// Seed DTOs. Pure data with caller-chosen ids.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySeed {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcategorySeed {
    pub id: SubcategoryId,
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSeed {
    pub id: DomainId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub governance: Governance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainValueSeed {
    pub id: DomainValueId,
    pub domain_id: DomainId,
    pub value: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "normative")]
    pub provenance: Provenance,
    #[serde(default)]
    pub justification: Option<String>,
}

fn normative() -> Provenance {
    Provenance::Normative
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSeed {
    pub id: AttributeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub data_type: DataType,
    #[serde(default)]
    pub domain_id: Option<DomainId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSeed {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub subcategory_id: Option<SubcategoryId>,
    pub attribute_id: AttributeId,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub sort_order: u32,
}

impl MappingSeed {
    pub fn target(&self) -> Result<MappingTarget> {
        match (&self.category_id, &self.subcategory_id) {
            (Some(c), None) => Ok(MappingTarget::Category(c.clone())),
            (None, Some(s)) => Ok(MappingTarget::Subcategory(s.clone())),
            (Some(_), Some(_)) => Err(classification_types::TypeError::MappingTarget("both").into()),
            (None, None) => Err(classification_types::TypeError::MappingTarget("neither").into()),
        }
    }
}

/// What `bootstrap` did with a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub bundle_hash: String,
    pub inserted: usize,
    pub skipped: usize,
}

impl SeedBundle {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut bundle: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ClassificationError::validation("seed_bundle", e.to_string()))?;
        if bundle.bundle_hash.is_empty() {
            bundle.bundle_hash = bundle.compute_hash()?;
        }
        Ok(bundle)
    }

    /// The jewelry catalog shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_JEWELRY)
    }

    /// Stable hash of the contents, independent of list order.
    pub fn compute_hash(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            categories: Vec<&'a CategorySeed>,
            subcategories: Vec<&'a SubcategorySeed>,
            domains: Vec<&'a DomainSeed>,
            domain_values: Vec<&'a DomainValueSeed>,
            attributes: Vec<&'a AttributeSeed>,
            mappings: Vec<&'a MappingSeed>,
        }

        let mut categories: Vec<_> = self.categories.iter().collect();
        categories.sort_by_key(|s| &s.id);
        let mut subcategories: Vec<_> = self.subcategories.iter().collect();
        subcategories.sort_by_key(|s| &s.id);
        let mut domains: Vec<_> = self.domains.iter().collect();
        domains.sort_by_key(|s| &s.id);
        let mut domain_values: Vec<_> = self.domain_values.iter().collect();
        domain_values.sort_by_key(|s| &s.id);
        let mut attributes: Vec<_> = self.attributes.iter().collect();
        attributes.sort_by_key(|s| &s.id);
        let mut mappings: Vec<_> = self.mappings.iter().collect();
        mappings.sort_by(|a, b| {
            (&a.category_id, &a.subcategory_id, &a.attribute_id)
                .cmp(&(&b.category_id, &b.subcategory_id, &b.attribute_id))
        });

        let canonical = Canonical {
            categories,
            subcategories,
            domains,
            domain_values,
            attributes,
            mappings,
        };
        let json = serde_json::to_string(&canonical).map_err(anyhow::Error::from)?;
        let hash = Sha256::digest(json.as_bytes());
        Ok(format!("v1:{}", hex::encode(hash)))
    }

    /// Check the bundle against the catalog invariants before touching a store.
    pub fn validate(&self) -> Result<()> {
        let categories: HashSet<&CategoryId> = self.categories.iter().map(|c| &c.id).collect();
        let subcategories: HashSet<&SubcategoryId> = self.subcategories.iter().map(|s| &s.id).collect();
        let domains: HashSet<&DomainId> = self.domains.iter().map(|d| &d.id).collect();
        let attributes: HashSet<&AttributeId> = self.attributes.iter().map(|a| &a.id).collect();

        for sub in &self.subcategories {
            if !categories.contains(&sub.category_id) {
                return Err(seed_error("subcategories", &sub.id, format!("unknown category '{}'", sub.category_id)));
            }
        }
        for value in &self.domain_values {
            if !domains.contains(&value.domain_id) {
                return Err(seed_error("domain_values", &value.id, format!("unknown domain '{}'", value.domain_id)));
            }
            let justified = value.justification.as_deref().is_some_and(|j| !j.trim().is_empty());
            if value.provenance == Provenance::UserAdded && !justified {
                return Err(seed_error("domain_values", &value.id, "USER_ADDED value without justification"));
            }
        }
        for attr in &self.attributes {
            match (attr.data_type.requires_domain(), &attr.domain_id) {
                (true, None) => return Err(seed_error("attributes", &attr.id, "LIST attribute requires domain")),
                (true, Some(d)) if !domains.contains(d) => {
                    return Err(seed_error("attributes", &attr.id, format!("unknown domain '{d}'")))
                }
                (false, Some(_)) => {
                    return Err(seed_error("attributes", &attr.id, "only LIST attributes reference a domain"))
                }
                _ => {}
            }
        }
        for mapping in &self.mappings {
            let target = mapping.target()?;
            let known = match &target {
                MappingTarget::Category(id) => categories.contains(id),
                MappingTarget::Subcategory(id) => subcategories.contains(id),
            };
            if !known {
                return Err(seed_error("mappings", &target, "unknown target"));
            }
            if !attributes.contains(&mapping.attribute_id) {
                return Err(seed_error(
                    "mappings",
                    &target,
                    format!("unknown attribute '{}'", mapping.attribute_id),
                ));
            }
        }
        Ok(())
    }
}

fn seed_error(section: &str, id: impl std::fmt::Display, message: impl Into<String>) -> ClassificationError {
    ClassificationError::validation(format!("{section}[{id}]"), message)
}

/// Insert every row of `bundle` not already present. Seeded mappings are audited.
pub(crate) async fn apply(
    bundle: &SeedBundle,
    store: Arc<dyn DocumentStore>,
    audit: &AuditTrail,
    actor: &Actor,
) -> Result<BootstrapReport> {
    bundle.validate()?;
    let now = Utc::now();
    let mut report = BootstrapReport {
        bundle_hash: bundle.bundle_hash.clone(),
        ..Default::default()
    };

    let rows = bundle.categories.iter().map(|s| Category {
        id: s.id.clone(),
        name: s.name.clone(),
        description: s.description.clone(),
        active: true,
        created_at: now,
        created_by: actor.actor_id.clone(),
        updated_at: None,
    });
    insert_missing(&store, rows, &mut report).await?;

    let rows = bundle.subcategories.iter().map(|s| Subcategory {
        id: s.id.clone(),
        category_id: s.category_id.clone(),
        name: s.name.clone(),
        description: s.description.clone(),
        active: true,
        created_at: now,
        created_by: actor.actor_id.clone(),
        updated_at: None,
    });
    insert_missing(&store, rows, &mut report).await?;

    let rows = bundle.domains.iter().map(|s| Domain {
        id: s.id.clone(),
        code: s.code.clone(),
        name: s.name.clone(),
        description: s.description.clone(),
        governance: s.governance,
        active: true,
        created_at: now,
        created_by: actor.actor_id.clone(),
        updated_at: None,
    });
    insert_missing(&store, rows, &mut report).await?;

    let rows = bundle.domain_values.iter().map(|s| DomainValue {
        id: s.id.clone(),
        domain_id: s.domain_id.clone(),
        value: s.value.clone(),
        sort_order: s.sort_order,
        provenance: s.provenance,
        justification: s.justification.clone(),
        active: true,
        created_at: now,
        created_by: actor.actor_id.clone(),
        updated_at: None,
    });
    insert_missing(&store, rows, &mut report).await?;

    let rows = bundle.attributes.iter().map(|s| Attribute {
        id: s.id.clone(),
        name: s.name.clone(),
        description: s.description.clone(),
        data_type: s.data_type,
        domain_id: s.domain_id.clone(),
        active: true,
        created_at: now,
        created_by: actor.actor_id.clone(),
        updated_at: None,
    });
    insert_missing(&store, rows, &mut report).await?;

    let mappings: Repository<ClassificationMapping> = Repository::new(Arc::clone(&store));
    for seed in &bundle.mappings {
        let target = seed.target()?;
        let mut mapping =
            ClassificationMapping::new(target.clone(), seed.attribute_id.clone(), seed.sort_order, actor.actor_id.as_str());
        mapping.is_mandatory = seed.is_mandatory;
        if mappings.get(mapping.id.as_str()).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        mappings.insert(&mapping).await?;
        audit
            .record(
                &actor.actor_id,
                AuditAction::Create,
                &target,
                format!("seeded attribute '{}' from bundle {}", seed.attribute_id, bundle.bundle_hash),
            )
            .await?;
        report.inserted += 1;
    }

    tracing::info!(
        bundle_hash = %report.bundle_hash,
        inserted = report.inserted,
        skipped = report.skipped,
        "seed bundle applied"
    );
    Ok(report)
}

async fn insert_missing<T: Document>(
    store: &Arc<dyn DocumentStore>,
    rows: impl Iterator<Item = T>,
    report: &mut BootstrapReport,
) -> Result<()> {
    let repo: Repository<T> = Repository::new(Arc::clone(store));
    for row in rows {
        if repo.get(row.doc_id()).await?.is_some() {
            report.skipped += 1;
        } else {
            repo.insert(&row).await?;
            report.inserted += 1;
        }
    }
    Ok(())
}
