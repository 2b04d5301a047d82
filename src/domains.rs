//! Governed vocabularies for LIST attributes.
//!
//! Governance rules for vocabulary changes (add, update, deactivate value):
//! - privileged actors may change any domain
//! - other actors may only touch SEMI_CLOSED domains, and only USER_ADDED values
//! - a USER_ADDED value always carries a non-empty justification

use std::sync::Arc;

use chrono::Utc;

use classification_types::{
    Domain, DomainId, DomainPatch, DomainValue, DomainValueId, DomainValuePatch, Governance,
    NewDomain, NewDomainValue, Provenance,
};

use crate::config::EngineConfig;
use crate::error::{ClassificationError, Result};
use crate::principal::Actor;
use crate::store::{DocumentStore, Filter, Repository};

#[derive(Clone)]
pub struct DomainCatalog {
    domains: Repository<Domain>,
    values: Repository<DomainValue>,
    config: Arc<EngineConfig>,
}

impl DomainCatalog {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<EngineConfig>) -> Self {
        Self {
            domains: Repository::new(Arc::clone(&store)),
            values: Repository::new(store),
            config,
        }
    }

    fn is_privileged(&self, actor: &Actor) -> bool {
        actor.has_any_role(&self.config.privileged_roles)
    }

    fn authorize_vocabulary_change(
        &self,
        actor: &Actor,
        domain: &Domain,
        provenance: Provenance,
    ) -> Result<()> {
        if self.is_privileged(actor) {
            if domain.governance == Governance::Closed && provenance == Provenance::UserAdded {
                tracing::warn!(
                    domain = %domain.code,
                    actor = %actor.actor_id,
                    "user-added value on a CLOSED domain"
                );
            }
            return Ok(());
        }
        if domain.governance == Governance::Closed {
            return Err(ClassificationError::Unauthorized(format!(
                "domain '{}' is CLOSED; '{}' may not change its values",
                domain.code, actor.actor_id
            )));
        }
        if provenance == Provenance::Normative {
            return Err(ClassificationError::Unauthorized(format!(
                "only privileged actors may manage NORMATIVE values (actor '{}')",
                actor.actor_id
            )));
        }
        Ok(())
    }

    // ── Domains ────────────────────────────────────────────────

    pub async fn create_domain(&self, actor: &Actor, new: NewDomain) -> Result<Domain> {
        let name = required_text("name", &new.name)?;
        let code = normalize_code(new.code.as_deref().unwrap_or(&name));
        if code.is_empty() {
            return Err(ClassificationError::validation(
                "code",
                "domain code must contain at least one letter or digit",
            ));
        }
        if self.find_domain_by_code(&code).await?.is_some() {
            return Err(ClassificationError::Conflict(format!(
                "domain code '{code}' already in use"
            )));
        }

        let domain = Domain {
            id: DomainId::generate(),
            code,
            name,
            description: optional_text(new.description),
            governance: new.governance,
            active: true,
            created_at: Utc::now(),
            created_by: actor.actor_id.clone(),
            updated_at: None,
        };
        self.domains.insert(&domain).await?;
        tracing::info!(domain_id = %domain.id, code = %domain.code, actor = %actor.actor_id, "domain created");
        Ok(domain)
    }

    pub async fn get_domain(&self, id: &DomainId) -> Result<Domain> {
        self.domains.require_active(id.as_str()).await
    }

    pub async fn find_domain_by_code(&self, code: &str) -> Result<Option<Domain>> {
        let code = normalize_code(code);
        Ok(self
            .domains
            .query_active(&[Filter::eq("code", code.as_str())])
            .await?
            .into_iter()
            .next())
    }

    pub async fn list_domains(&self) -> Result<Vec<Domain>> {
        self.domains.query_active(&[]).await
    }

    pub async fn update_domain(
        &self,
        actor: &Actor,
        id: &DomainId,
        patch: DomainPatch,
    ) -> Result<Domain> {
        let mut domain = self.get_domain(id).await?;
        if let Some(name) = patch.name {
            domain.name = required_text("name", &name)?;
        }
        if let Some(description) = patch.description {
            domain.description = optional_text(Some(description));
        }
        if let Some(governance) = patch.governance {
            if governance != domain.governance && !self.is_privileged(actor) {
                return Err(ClassificationError::Unauthorized(format!(
                    "'{}' may not change governance of domain '{}'",
                    actor.actor_id, domain.code
                )));
            }
            domain.governance = governance;
        }
        domain.updated_at = Some(Utc::now());
        self.domains.upsert(&domain).await?;
        tracing::info!(domain_id = %domain.id, actor = %actor.actor_id, "domain updated");
        Ok(domain)
    }

    /// Soft delete. Values and LIST attributes referencing the domain are untouched.
    pub async fn deactivate_domain(&self, actor: &Actor, id: &DomainId) -> Result<()> {
        let domain = self
            .domains
            .get(id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("domain", id))?;
        if !domain.active {
            return Ok(());
        }
        self.domains.soft_delete(id.as_str()).await?;
        tracing::info!(domain_id = %id, actor = %actor.actor_id, "domain deactivated");
        Ok(())
    }

    // ── Values ─────────────────────────────────────────────────

    pub async fn add_value(&self, actor: &Actor, new: NewDomainValue) -> Result<DomainValue> {
        let value = required_text("value", &new.value)?;
        let domain = self
            .domains
            .get(new.domain_id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("domain", &new.domain_id))?;
        if !domain.active {
            return Err(ClassificationError::validation(
                "domain_id",
                format!("domain '{}' is inactive", domain.code),
            ));
        }
        let justification = optional_text(new.justification);
        check_justification(new.provenance, justification.as_deref())?;
        self.authorize_vocabulary_change(actor, &domain, new.provenance)?;
        self.ensure_unique_value(&domain.id, &value, None).await?;

        let dv = DomainValue {
            id: DomainValueId::generate(),
            domain_id: domain.id.clone(),
            value,
            sort_order: new.sort_order,
            provenance: new.provenance,
            justification,
            active: true,
            created_at: Utc::now(),
            created_by: actor.actor_id.clone(),
            updated_at: None,
        };
        self.values.insert(&dv).await?;
        tracing::info!(
            domain = %domain.code,
            value_id = %dv.id,
            provenance = %dv.provenance,
            actor = %actor.actor_id,
            "domain value added"
        );
        Ok(dv)
    }

    pub async fn get_value(&self, id: &DomainValueId) -> Result<DomainValue> {
        self.values.require_active(id.as_str()).await
    }

    pub async fn update_value(
        &self,
        actor: &Actor,
        id: &DomainValueId,
        patch: DomainValuePatch,
    ) -> Result<DomainValue> {
        let mut dv = self.get_value(id).await?;
        let domain = self
            .domains
            .get(dv.domain_id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("domain", &dv.domain_id))?;
        self.authorize_vocabulary_change(actor, &domain, dv.provenance)?;

        if let Some(value) = patch.value {
            let value = required_text("value", &value)?;
            self.ensure_unique_value(&dv.domain_id, &value, Some(&dv.id))
                .await?;
            dv.value = value;
        }
        if let Some(sort_order) = patch.sort_order {
            dv.sort_order = sort_order;
        }
        if let Some(provenance) = patch.provenance {
            self.authorize_vocabulary_change(actor, &domain, provenance)?;
            dv.provenance = provenance;
        }
        if let Some(justification) = patch.justification {
            dv.justification = optional_text(Some(justification));
        }
        check_justification(dv.provenance, dv.justification.as_deref())?;

        dv.updated_at = Some(Utc::now());
        self.values.upsert(&dv).await?;
        tracing::info!(value_id = %dv.id, actor = %actor.actor_id, "domain value updated");
        Ok(dv)
    }

    /// Soft delete; deactivating an inactive value is a no-op.
    pub async fn deactivate_value(&self, actor: &Actor, id: &DomainValueId) -> Result<()> {
        let dv = self
            .values
            .get(id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("domain value", id))?;
        if !dv.active {
            return Ok(());
        }
        if let Some(domain) = self.domains.get(dv.domain_id.as_str()).await? {
            self.authorize_vocabulary_change(actor, &domain, dv.provenance)?;
        }
        self.values.soft_delete(id.as_str()).await?;
        tracing::info!(value_id = %id, actor = %actor.actor_id, "domain value deactivated");
        Ok(())
    }

    /// Active values of an active domain, by `sort_order` then insertion order.
    pub async fn list_values(&self, domain_id: &DomainId) -> Result<Vec<DomainValue>> {
        self.get_domain(domain_id).await?;
        let mut values = self
            .values
            .query_active(&[Filter::eq("domain_id", domain_id.as_str())])
            .await?;
        // Stable sort keeps creation order for equal sort_order.
        values.sort_by_key(|v| v.sort_order);
        Ok(values)
    }

    /// Whether `value_id` is an active value of `domain_id`.
    pub async fn contains_value(&self, domain_id: &DomainId, value_id: &DomainValueId) -> Result<bool> {
        Ok(self
            .values
            .get_active(value_id.as_str())
            .await?
            .is_some_and(|v| &v.domain_id == domain_id))
    }

    async fn ensure_unique_value(
        &self,
        domain_id: &DomainId,
        value: &str,
        except: Option<&DomainValueId>,
    ) -> Result<()> {
        let existing = self
            .values
            .query_active(&[Filter::eq("domain_id", domain_id.as_str())])
            .await?;
        let clash = existing
            .iter()
            .filter(|v| Some(&v.id) != except)
            .any(|v| v.value.trim().to_lowercase() == value.to_lowercase());
        if clash {
            return Err(ClassificationError::Conflict(format!(
                "value '{value}' already exists in domain '{domain_id}'"
            )));
        }
        Ok(())
    }
}

fn check_justification(provenance: Provenance, justification: Option<&str>) -> Result<()> {
    if provenance == Provenance::UserAdded && justification.is_none() {
        return Err(ClassificationError::validation(
            "justification",
            "USER_ADDED values require a justification",
        ));
    }
    Ok(())
}

pub(crate) fn required_text(field: &str, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClassificationError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Stable domain code: `"Color del Metal"` → `"COLOR_DEL_METAL"`.
pub fn normalize_code(raw: &str) -> String {
    let mut code = String::with_capacity(raw.len());
    for ch in raw.chars().map(fold_accent) {
        if ch.is_ascii_alphanumeric() {
            code.push(ch.to_ascii_uppercase());
        } else if !code.ends_with('_') && !code.is_empty() {
            code.push('_');
        }
    }
    code.trim_end_matches('_').to_string()
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;

    fn catalog() -> DomainCatalog {
        DomainCatalog::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(EngineConfig::default()),
        )
    }

    fn admin() -> Actor {
        Actor::in_process("admin", vec!["admin".into()])
    }

    fn clerk() -> Actor {
        Actor::in_process("dependiente", vec!["sales".into()])
    }

    #[test]
    fn code_normalization() {
        assert_eq!(normalize_code("Color del Metal"), "COLOR_DEL_METAL");
        assert_eq!(normalize_code("Ley / Quilataje"), "LEY_QUILATAJE");
        assert_eq!(normalize_code("  Técnica  Especial "), "TECNICA_ESPECIAL");
        assert_eq!(normalize_code("???"), "");
    }

    #[tokio::test]
    async fn create_domain_requires_name() {
        let err = catalog()
            .create_domain(&admin(), NewDomain::new("  ", Governance::Closed))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[tokio::test]
    async fn create_domain_derives_unique_code() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Material Principal", Governance::SemiClosed))
            .await
            .unwrap();
        assert_eq!(d.code, "MATERIAL_PRINCIPAL");
        assert!(d.active);

        let err = cat
            .create_domain(&admin(), NewDomain::new("material principal", Governance::Closed))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::Conflict(_)));
    }

    #[tokio::test]
    async fn user_added_without_justification_rejected() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Material", Governance::SemiClosed))
            .await
            .unwrap();
        let mut new = NewDomainValue::user_added(d.id.clone(), "Titanio", 4, "   ");
        let err = cat.add_value(&clerk(), new.clone()).await.unwrap_err();
        assert_eq!(err.field(), Some("justification"));

        new.justification = Some("Proveedor nuevo".into());
        let v = cat.add_value(&clerk(), new).await.unwrap();
        assert_eq!(v.provenance, Provenance::UserAdded);
    }

    #[tokio::test]
    async fn closed_domain_rejects_unprivileged_actor() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Color del Metal", Governance::Closed))
            .await
            .unwrap();
        let err = cat
            .add_value(&clerk(), NewDomainValue::user_added(d.id.clone(), "Negro", 9, "moda"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::Unauthorized(_)));

        cat.add_value(&admin(), NewDomainValue::normative(d.id, "Amarillo", 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn semi_closed_rejects_unprivileged_normative() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Tipo de Piedra", Governance::SemiClosed))
            .await
            .unwrap();
        let err = cat
            .add_value(&clerk(), NewDomainValue::normative(d.id, "Ópalo", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn inactive_domain_rejects_values() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Uso", Governance::Closed))
            .await
            .unwrap();
        cat.deactivate_domain(&admin(), &d.id).await.unwrap();
        let err = cat
            .add_value(&admin(), NewDomainValue::normative(d.id, "Diario", 1))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("domain_id"));
    }

    #[tokio::test]
    async fn list_values_sorted_with_insertion_tiebreak() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Material", Governance::SemiClosed))
            .await
            .unwrap();
        for (v, order) in [("Platino", 3), ("Oro", 1), ("Plata", 2), ("Paladio", 2)] {
            cat.add_value(&admin(), NewDomainValue::normative(d.id.clone(), v, order))
                .await
                .unwrap();
        }
        let listed: Vec<_> = cat
            .list_values(&d.id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.value)
            .collect();
        assert_eq!(listed, vec!["Oro", "Plata", "Paladio", "Platino"]);
    }

    #[tokio::test]
    async fn deactivated_values_leave_listing() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Acabado", Governance::Closed))
            .await
            .unwrap();
        let mate = cat
            .add_value(&admin(), NewDomainValue::normative(d.id.clone(), "Mate", 1))
            .await
            .unwrap();
        cat.add_value(&admin(), NewDomainValue::normative(d.id.clone(), "Pulido", 2))
            .await
            .unwrap();
        cat.deactivate_value(&admin(), &mate.id).await.unwrap();
        cat.deactivate_value(&admin(), &mate.id).await.unwrap();

        let listed = cat.list_values(&d.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!cat.contains_value(&d.id, &mate.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_value_conflicts_case_insensitively() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Material", Governance::SemiClosed))
            .await
            .unwrap();
        cat.add_value(&admin(), NewDomainValue::normative(d.id.clone(), "Oro", 1))
            .await
            .unwrap();
        let err = cat
            .add_value(&admin(), NewDomainValue::normative(d.id, " oro ", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_value_to_user_added_requires_justification() {
        let cat = catalog();
        let d = cat
            .create_domain(&admin(), NewDomain::new("Material", Governance::SemiClosed))
            .await
            .unwrap();
        let v = cat
            .add_value(&admin(), NewDomainValue::normative(d.id, "Oro", 1))
            .await
            .unwrap();
        let err = cat
            .update_value(
                &admin(),
                &v.id,
                DomainValuePatch {
                    provenance: Some(Provenance::UserAdded),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("justification"));

        let updated = cat
            .update_value(
                &admin(),
                &v.id,
                DomainValuePatch {
                    sort_order: Some(7),
                    value: Some("Oro fino".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.sort_order, 7);
        assert_eq!(updated.value, "Oro fino");
        assert!(updated.updated_at.is_some());
    }
}
