//! Classification mapping resolver.
//!
//! Binds catalog attributes to taxonomy nodes and resolves the effective
//! attribute set of a node. A subcategory sees its own mappings plus those of
//! its category, with its own mapping winning for the same attribute.
//!
//! Every mutation appends one audit entry against the node that owns the
//! changed row. Mutations on one target are serialized in-process through
//! [`TargetLocks`]; separate engines sharing a store can still interleave.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use classification_types::{
    Attribute, AttributeId, AuditAction, Category, CategoryId, ClassificationMapping,
    EffectiveAttribute, MappingKey, MappingTarget, Subcategory, SubcategoryId,
};

use crate::audit::AuditTrail;
use crate::config::EngineConfig;
use crate::error::{ClassificationError, Result};
use crate::principal::Actor;
use crate::store::{DocumentStore, Filter, Repository};

/// Which rows a subcategory-scoped mutation actually touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeScope {
    /// The mapping belongs to the requested target.
    Direct,
    /// The attribute was inherited; the category-level row was changed and
    /// every listed subcategory sees the change.
    CategoryWide {
        category_id: CategoryId,
        affected_subcategories: Vec<SubcategoryId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingChange {
    pub mapping: ClassificationMapping,
    pub scope: ChangeScope,
}

impl MappingChange {
    pub fn is_category_wide(&self) -> bool {
        matches!(self.scope, ChangeScope::CategoryWide { .. })
    }
}

/// One async mutex per mapping target.
///
/// Entries nobody holds or waits on are pruned on the next `acquire`.
#[derive(Default)]
pub struct TargetLocks {
    inner: Mutex<HashMap<MappingTarget, Arc<tokio::sync::Mutex<()>>>>,
}

impl TargetLocks {
    pub async fn acquire(&self, target: &MappingTarget) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self.inner.lock().map_err(|e| anyhow!("Lock: {}", e))?;
            // Held and queued locks keep a second reference through their guard or clone.
            map.retain(|key, lock| key == target || Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(target.clone()).or_default())
        };
        Ok(lock.lock_owned().await)
    }
}

#[derive(Clone)]
pub struct Resolver {
    mappings: Repository<ClassificationMapping>,
    categories: Repository<Category>,
    subcategories: Repository<Subcategory>,
    attributes: Repository<Attribute>,
    audit: AuditTrail,
    locks: Arc<TargetLocks>,
    config: Arc<EngineConfig>,
}

impl Resolver {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditTrail, config: Arc<EngineConfig>) -> Self {
        Self {
            mappings: Repository::new(Arc::clone(&store)),
            categories: Repository::new(Arc::clone(&store)),
            subcategories: Repository::new(Arc::clone(&store)),
            attributes: Repository::new(store),
            audit,
            locks: Arc::new(TargetLocks::default()),
            config,
        }
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Resolve the attribute set for a category or a subcategory.
    ///
    /// With a subcategory, direct mappings shadow category mappings of the
    /// same attribute and the rest are marked inherited. When both ids are
    /// given they must agree. Mappings of inactive attributes never appear.
    pub async fn get_effective_attributes(
        &self,
        category_id: Option<&CategoryId>,
        subcategory_id: Option<&SubcategoryId>,
    ) -> Result<Vec<EffectiveAttribute>> {
        let live_attributes = self.active_attribute_ids().await?;
        let live = |m: &ClassificationMapping| live_attributes.contains(&m.attribute_id);

        let Some(subcategory_id) = subcategory_id else {
            let category_id = category_id.ok_or_else(|| {
                ClassificationError::validation(
                    "category_id",
                    "either category_id or subcategory_id is required",
                )
            })?;
            self.categories.require_active(category_id.as_str()).await?;
            let mut direct = self
                .active_mappings(&MappingTarget::Category(category_id.clone()))
                .await?;
            direct.retain(|m| live(m));
            sort_mappings(&mut direct);
            tracing::debug!(category_id = %category_id, count = direct.len(), "resolved category attributes");
            return Ok(direct
                .into_iter()
                .map(|mapping| EffectiveAttribute { mapping, is_inherited: false })
                .collect());
        };

        let sub = self.subcategories.require_active(subcategory_id.as_str()).await?;
        if let Some(category_id) = category_id {
            if *category_id != sub.category_id {
                return Err(ClassificationError::validation(
                    "category_id",
                    format!(
                        "subcategory '{}' belongs to category '{}', not '{}'",
                        sub.id, sub.category_id, category_id
                    ),
                ));
            }
        }

        let mut direct = self
            .active_mappings(&MappingTarget::Subcategory(sub.id.clone()))
            .await?;
        direct.retain(|m| live(m));

        let inherit = match self.categories.get(sub.category_id.as_str()).await? {
            Some(category) => category.active || !self.config.hide_inactive_nodes,
            None => false,
        };
        let inherited = if inherit {
            let shadowed: HashSet<&AttributeId> = direct.iter().map(|m| &m.attribute_id).collect();
            self.active_mappings(&MappingTarget::Category(sub.category_id.clone()))
                .await?
                .into_iter()
                .filter(|m| live(m) && !shadowed.contains(&m.attribute_id))
                .collect()
        } else {
            Vec::new()
        };

        let mut effective: Vec<EffectiveAttribute> = direct
            .into_iter()
            .map(|mapping| EffectiveAttribute { mapping, is_inherited: false })
            .chain(
                inherited
                    .into_iter()
                    .map(|mapping| EffectiveAttribute { mapping, is_inherited: true }),
            )
            .collect();
        // Stable: on equal sort_order, direct entries stay ahead of inherited ones.
        effective.sort_by_key(|e| e.mapping.sort_order);

        tracing::debug!(
            subcategory_id = %sub.id,
            count = effective.len(),
            inherited = effective.iter().filter(|e| e.is_inherited).count(),
            "resolved subcategory attributes"
        );
        Ok(effective)
    }

    /// Active mappings owned by `target` itself, by sort order.
    pub async fn list_direct_mappings(&self, target: &MappingTarget) -> Result<Vec<ClassificationMapping>> {
        self.require_target(target).await?;
        let mut mappings = self.active_mappings(target).await?;
        sort_mappings(&mut mappings);
        Ok(mappings)
    }

    // ── Mutations ──────────────────────────────────────────────

    /// Attach `attribute_id` to `target`, appended after the existing mappings.
    ///
    /// Repeating the call for an active mapping returns it unchanged and
    /// writes no audit entry. A previously removed mapping is reactivated.
    pub async fn add_mapping(
        &self,
        actor: &Actor,
        target: &MappingTarget,
        attribute_id: &AttributeId,
    ) -> Result<ClassificationMapping> {
        let _guard = self.locks.acquire(target).await?;
        self.require_target(target).await?;
        let attribute = self.attributes.require_active(attribute_id.as_str()).await?;

        let key = MappingKey::new(target, attribute_id);
        let existing = self.mappings.get(key.as_str()).await?;
        if let Some(mapping) = existing.as_ref().filter(|m| m.active) {
            tracing::debug!(mapping = %key, "mapping already attached");
            return Ok(mapping.clone());
        }

        let next_order = self.next_position(target).await?;
        let mapping = match existing {
            Some(mut mapping) => {
                mapping.active = true;
                mapping.is_mandatory = false;
                mapping.sort_order = next_order;
                mapping.updated_at = Utc::now();
                mapping.updated_by = actor.actor_id.clone();
                self.mappings.upsert(&mapping).await?;
                mapping
            }
            None => {
                let mapping = ClassificationMapping::new(
                    target.clone(),
                    attribute_id.clone(),
                    next_order,
                    actor.actor_id.as_str(),
                );
                match self.mappings.insert(&mapping).await {
                    Ok(()) => mapping,
                    // Another writer created the same key first.
                    Err(ClassificationError::Conflict(_)) => {
                        return self
                            .mappings
                            .get(key.as_str())
                            .await?
                            .ok_or_else(|| ClassificationError::not_found("mapping", &key));
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        self.audit
            .record(
                &actor.actor_id,
                AuditAction::Create,
                target,
                format!("attached attribute '{}' at position {}", attribute.name, mapping.sort_order),
            )
            .await?;
        tracing::info!(
            target_id = %target.id(),
            attribute_id = %attribute_id,
            actor = %actor.actor_id,
            "mapping added"
        );
        Ok(mapping)
    }

    /// Create or overwrite the mapping with explicit flags.
    ///
    /// `sort_order: None` keeps the current position, or appends for a new row.
    pub async fn upsert_mapping(
        &self,
        actor: &Actor,
        target: &MappingTarget,
        attribute_id: &AttributeId,
        is_mandatory: bool,
        sort_order: Option<u32>,
    ) -> Result<ClassificationMapping> {
        let _guard = self.locks.acquire(target).await?;
        self.require_target(target).await?;
        let attribute = self.attributes.require_active(attribute_id.as_str()).await?;

        let key = MappingKey::new(target, attribute_id);
        let existing = self.mappings.get(key.as_str()).await?.filter(|m| m.active);
        let action = if existing.is_some() {
            AuditAction::Update
        } else {
            AuditAction::Create
        };
        let sort_order = match (sort_order, &existing) {
            (Some(order), _) => order,
            (None, Some(current)) => current.sort_order,
            (None, None) => self.next_position(target).await?,
        };

        let mut mapping =
            ClassificationMapping::new(target.clone(), attribute_id.clone(), sort_order, actor.actor_id.as_str());
        mapping.is_mandatory = is_mandatory;
        self.mappings.upsert(&mapping).await?;

        self.audit
            .record(
                &actor.actor_id,
                action,
                target,
                format!(
                    "set attribute '{}' mandatory={} position={}",
                    attribute.name, is_mandatory, sort_order
                ),
            )
            .await?;
        tracing::info!(
            target_id = %target.id(),
            attribute_id = %attribute_id,
            actor = %actor.actor_id,
            "mapping upserted"
        );
        Ok(mapping)
    }

    /// Detach `attribute_id` from `target`.
    ///
    /// For a subcategory that only inherits the attribute, the category row is
    /// removed and the returned scope lists every subcategory affected.
    pub async fn remove_mapping(
        &self,
        actor: &Actor,
        target: &MappingTarget,
        attribute_id: &AttributeId,
    ) -> Result<MappingChange> {
        let (owner, scope) = self.resolve_owner(target, attribute_id).await?;
        let _guard = self.locks.acquire(&owner).await?;
        let mut mapping = self.require_active_mapping(&owner, attribute_id).await?;

        mapping.active = false;
        mapping.updated_at = Utc::now();
        mapping.updated_by = actor.actor_id.clone();
        self.mappings.upsert(&mapping).await?;

        let name = self.attribute_label(attribute_id).await?;
        self.audit
            .record(
                &actor.actor_id,
                AuditAction::Delete,
                &owner,
                scoped_details(format!("detached attribute '{name}'"), &scope),
            )
            .await?;
        log_change("mapping removed", actor, &owner, attribute_id, &scope);
        Ok(MappingChange { mapping, scope })
    }

    /// Flip `is_mandatory` on the row that owns it (the category row when inherited).
    pub async fn toggle_mandatory(
        &self,
        actor: &Actor,
        target: &MappingTarget,
        attribute_id: &AttributeId,
    ) -> Result<MappingChange> {
        let (owner, scope) = self.resolve_owner(target, attribute_id).await?;
        let _guard = self.locks.acquire(&owner).await?;
        let mut mapping = self.require_active_mapping(&owner, attribute_id).await?;

        mapping.is_mandatory = !mapping.is_mandatory;
        mapping.updated_at = Utc::now();
        mapping.updated_by = actor.actor_id.clone();
        self.mappings.upsert(&mapping).await?;

        let name = self.attribute_label(attribute_id).await?;
        self.audit
            .record(
                &actor.actor_id,
                AuditAction::Update,
                &owner,
                scoped_details(
                    format!("attribute '{name}' mandatory set to {}", mapping.is_mandatory),
                    &scope,
                ),
            )
            .await?;
        log_change("mandatory flag toggled", actor, &owner, attribute_id, &scope);
        Ok(MappingChange { mapping, scope })
    }

    /// Rewrite the target's sort orders as `0..N-1` following `ordered`.
    ///
    /// `ordered` must list every active direct mapping of the target exactly once.
    pub async fn reorder_mappings(
        &self,
        actor: &Actor,
        target: &MappingTarget,
        ordered: &[AttributeId],
    ) -> Result<Vec<ClassificationMapping>> {
        let _guard = self.locks.acquire(target).await?;
        self.require_target(target).await?;

        let current = self.active_mappings(target).await?;
        check_reorder_set(&current, ordered)?;

        let mut by_attribute: HashMap<AttributeId, ClassificationMapping> = current
            .into_iter()
            .map(|m| (m.attribute_id.clone(), m))
            .collect();
        let now = Utc::now();
        let mut reordered = Vec::with_capacity(ordered.len());
        for (position, attribute_id) in ordered.iter().enumerate() {
            let Some(mut mapping) = by_attribute.remove(attribute_id) else {
                return Err(anyhow!("reorder lost mapping for '{attribute_id}'").into());
            };
            let position = position as u32;
            if mapping.sort_order != position {
                mapping.sort_order = position;
                mapping.updated_at = now;
                mapping.updated_by = actor.actor_id.clone();
                self.mappings.upsert(&mapping).await?;
            }
            reordered.push(mapping);
        }

        let order: Vec<&str> = ordered.iter().map(AttributeId::as_str).collect();
        self.audit
            .record(
                &actor.actor_id,
                AuditAction::Reorder,
                target,
                format!("reordered {} attributes: {}", order.len(), order.join(", ")),
            )
            .await?;
        tracing::info!(target_id = %target.id(), count = reordered.len(), actor = %actor.actor_id, "mappings reordered");
        Ok(reordered)
    }

    /// Soft-delete every active mapping of `attribute_id`, each retried up to
    /// `cascade_max_attempts` times on retryable failures.
    ///
    /// Returns how many mappings this call removed. Re-running after a failure
    /// picks up whatever is still active.
    pub async fn remove_attribute_everywhere(&self, actor: &Actor, attribute_id: &AttributeId) -> Result<usize> {
        let doomed = self
            .mappings
            .query_active(&[Filter::eq("attribute_id", attribute_id.as_str())])
            .await?;
        let max_attempts = self.config.cascade_max_attempts.max(1);

        for mapping in &doomed {
            let mut attempt = 1;
            loop {
                match self.cascade_one(actor, mapping).await {
                    Ok(()) => break,
                    Err(e) if e.is_retryable() && attempt < max_attempts => {
                        tracing::warn!(
                            mapping = %mapping.id,
                            attempt,
                            max_attempts,
                            error = %e,
                            "cascade removal failed, retrying"
                        );
                        attempt += 1;
                    }
                    Err(e) => {
                        tracing::warn!(mapping = %mapping.id, attempt, error = %e, "cascade removal gave up");
                        return Err(e);
                    }
                }
            }
        }
        Ok(doomed.len())
    }

    async fn cascade_one(&self, actor: &Actor, mapping: &ClassificationMapping) -> Result<()> {
        let _guard = self.locks.acquire(&mapping.target).await?;
        let Some(mut current) = self.mappings.get(mapping.id.as_str()).await? else {
            return Ok(());
        };
        if current.active {
            current.active = false;
            current.updated_at = Utc::now();
            current.updated_by = actor.actor_id.clone();
            self.mappings.upsert(&current).await?;
        }
        self.audit
            .record(
                &actor.actor_id,
                AuditAction::Delete,
                &current.target,
                format!("cascade: attribute '{}' deactivated", current.attribute_id),
            )
            .await?;
        Ok(())
    }

    // ── Helpers ────────────────────────────────────────────────

    async fn active_mappings(&self, target: &MappingTarget) -> Result<Vec<ClassificationMapping>> {
        self.mappings
            .query_active(&[Filter::eq(target.field(), target.id())])
            .await
    }

    /// One past the highest active position, so appends never collide after removals.
    async fn next_position(&self, target: &MappingTarget) -> Result<u32> {
        Ok(self
            .active_mappings(target)
            .await?
            .iter()
            .map(|m| m.sort_order + 1)
            .max()
            .unwrap_or(0))
    }

    async fn active_attribute_ids(&self) -> Result<HashSet<AttributeId>> {
        Ok(self
            .attributes
            .query_active(&[])
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect())
    }

    async fn require_target(&self, target: &MappingTarget) -> Result<()> {
        match target {
            MappingTarget::Category(id) => {
                self.categories.require_active(id.as_str()).await?;
            }
            MappingTarget::Subcategory(id) => {
                self.subcategories.require_active(id.as_str()).await?;
            }
        }
        Ok(())
    }

    async fn require_active_mapping(
        &self,
        owner: &MappingTarget,
        attribute_id: &AttributeId,
    ) -> Result<ClassificationMapping> {
        let key = MappingKey::new(owner, attribute_id);
        self.mappings.require_active(key.as_str()).await
    }

    /// Where the mapping for `(target, attribute_id)` actually lives.
    async fn resolve_owner(
        &self,
        target: &MappingTarget,
        attribute_id: &AttributeId,
    ) -> Result<(MappingTarget, ChangeScope)> {
        self.require_target(target).await?;
        let direct = MappingKey::new(target, attribute_id);
        if self.mappings.get_active(direct.as_str()).await?.is_some() {
            return Ok((target.clone(), ChangeScope::Direct));
        }

        let MappingTarget::Subcategory(sub_id) = target else {
            return Err(ClassificationError::not_found("mapping", direct));
        };
        let sub = self
            .subcategories
            .get(sub_id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("subcategory", sub_id))?;
        let owner = MappingTarget::Category(sub.category_id.clone());
        let inherited = MappingKey::new(&owner, attribute_id);
        if self.mappings.get_active(inherited.as_str()).await?.is_none() {
            return Err(ClassificationError::not_found("mapping", direct));
        }

        let affected_subcategories = self
            .subcategories
            .query_active(&[Filter::eq("category_id", sub.category_id.as_str())])
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        Ok((
            owner,
            ChangeScope::CategoryWide {
                category_id: sub.category_id,
                affected_subcategories,
            },
        ))
    }

    async fn attribute_label(&self, attribute_id: &AttributeId) -> Result<String> {
        Ok(self
            .attributes
            .get(attribute_id.as_str())
            .await?
            .map_or_else(|| attribute_id.to_string(), |a| a.name))
    }
}

fn sort_mappings(mappings: &mut [ClassificationMapping]) {
    mappings.sort_by_key(|m| m.sort_order);
}

fn check_reorder_set(current: &[ClassificationMapping], ordered: &[AttributeId]) -> Result<()> {
    let expected: BTreeSet<&AttributeId> = current.iter().map(|m| &m.attribute_id).collect();
    let mut seen = BTreeSet::new();
    let duplicates: Vec<&str> = ordered
        .iter()
        .filter(|id| !seen.insert(*id))
        .map(AttributeId::as_str)
        .collect();
    let unknown: Vec<&str> = seen
        .iter()
        .filter(|id| !expected.contains(*id))
        .map(|id| id.as_str())
        .collect();
    let missing: Vec<&str> = expected
        .iter()
        .filter(|id| !seen.contains(*id))
        .map(|id| id.as_str())
        .collect();

    if duplicates.is_empty() && unknown.is_empty() && missing.is_empty() {
        return Ok(());
    }
    let mut problems = Vec::new();
    if !duplicates.is_empty() {
        problems.push(format!("duplicated [{}]", duplicates.join(", ")));
    }
    if !unknown.is_empty() {
        problems.push(format!("not mapped [{}]", unknown.join(", ")));
    }
    if !missing.is_empty() {
        problems.push(format!("missing [{}]", missing.join(", ")));
    }
    Err(ClassificationError::validation(
        "ordered_attribute_ids",
        format!("must list the current mappings exactly once: {}", problems.join("; ")),
    ))
}

fn scoped_details(base: String, scope: &ChangeScope) -> String {
    match scope {
        ChangeScope::Direct => base,
        ChangeScope::CategoryWide { affected_subcategories, .. } => format!(
            "{base} (inherited; affects {} subcategories)",
            affected_subcategories.len()
        ),
    }
}

fn log_change(
    what: &str,
    actor: &Actor,
    owner: &MappingTarget,
    attribute_id: &AttributeId,
    scope: &ChangeScope,
) {
    match scope {
        ChangeScope::Direct => tracing::info!(
            target_id = %owner.id(),
            attribute_id = %attribute_id,
            actor = %actor.actor_id,
            "{what}"
        ),
        ChangeScope::CategoryWide { affected_subcategories, .. } => tracing::warn!(
            target_id = %owner.id(),
            attribute_id = %attribute_id,
            actor = %actor.actor_id,
            affected = affected_subcategories.len(),
            "{what} on inherited category mapping"
        ),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::audit::InMemoryAuditStore;
    use crate::store::InMemoryDocumentStore;
    use classification_types::DataType;
    use proptest::prelude::*;

    async fn reorder_round(len: usize, permutation: Vec<usize>) -> Vec<(String, u32)> {
        let store = Arc::new(InMemoryDocumentStore::new());
        let trail = AuditTrail::new(Arc::new(InMemoryAuditStore::new()));
        let resolver = Resolver::new(store.clone(), trail, Arc::new(EngineConfig::default()));
        let now = Utc::now();

        Repository::<Category>::new(store.clone())
            .insert(&Category {
                id: CategoryId::new("cat_p"),
                name: "P".into(),
                description: None,
                active: true,
                created_at: now,
                created_by: "test".into(),
                updated_at: None,
            })
            .await
            .unwrap();
        let target = MappingTarget::Category(CategoryId::new("cat_p"));
        let attrs = Repository::<Attribute>::new(store.clone());
        let mut ids = Vec::new();
        for i in 0..len {
            let id = AttributeId::new(format!("attr_{i}"));
            attrs
                .insert(&Attribute {
                    id: id.clone(),
                    name: format!("A{i}"),
                    description: None,
                    data_type: DataType::Text,
                    domain_id: None,
                    active: true,
                    created_at: now,
                    created_by: "test".into(),
                    updated_at: None,
                })
                .await
                .unwrap();
            resolver.add_mapping(&Actor::system(), &target, &id).await.unwrap();
            ids.push(id);
        }

        let ordered: Vec<AttributeId> = permutation.iter().map(|&i| ids[i].clone()).collect();
        resolver.reorder_mappings(&Actor::system(), &target, &ordered).await.unwrap();
        resolver
            .get_effective_attributes(Some(&CategoryId::new("cat_p")), None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.mapping.attribute_id.to_string(), e.mapping.sort_order))
            .collect()
    }

    fn arb_permutation() -> impl Strategy<Value = (usize, Vec<usize>)> {
        (1usize..8).prop_flat_map(|len| (Just(len), Just((0..len).collect::<Vec<_>>()).prop_shuffle()))
    }

    proptest! {
        #[test]
        fn reorder_follows_any_permutation((len, permutation) in arb_permutation()) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result = rt.block_on(reorder_round(len, permutation.clone()));
            let expected: Vec<(String, u32)> = permutation
                .iter()
                .enumerate()
                .map(|(pos, &i)| (format!("attr_{i}"), pos as u32))
                .collect();
            prop_assert_eq!(result, expected);
        }
    }
}
