//! Attribute catalog.

use std::sync::Arc;

use chrono::Utc;

use classification_types::{Attribute, AttributeId, AttributePatch, DataType, Domain, DomainId, NewAttribute};

use crate::domains::{optional_text, required_text};
use crate::error::{ClassificationError, Result};
use crate::mappings::Resolver;
use crate::principal::Actor;
use crate::store::{DocumentStore, Repository};
use crate::taxonomy::ensure_unique_name;

#[derive(Clone)]
pub struct AttributeCatalog {
    attributes: Repository<Attribute>,
    domains: Repository<Domain>,
    resolver: Resolver,
}

impl AttributeCatalog {
    pub fn new(store: Arc<dyn DocumentStore>, resolver: Resolver) -> Self {
        Self {
            attributes: Repository::new(Arc::clone(&store)),
            domains: Repository::new(store),
            resolver,
        }
    }

    pub async fn create_attribute(&self, actor: &Actor, new: NewAttribute) -> Result<Attribute> {
        let name = required_text("name", &new.name)?;
        let domain_id = self
            .check_domain(new.data_type, new.domain_id.filter(|d| !d.is_empty()))
            .await?;
        self.ensure_unique(&name, None).await?;

        let attribute = Attribute {
            id: AttributeId::generate(),
            name,
            description: optional_text(new.description),
            data_type: new.data_type,
            domain_id,
            active: true,
            created_at: Utc::now(),
            created_by: actor.actor_id.clone(),
            updated_at: None,
        };
        self.attributes.insert(&attribute).await?;
        tracing::info!(
            attribute_id = %attribute.id,
            data_type = %attribute.data_type,
            actor = %actor.actor_id,
            "attribute created"
        );
        Ok(attribute)
    }

    pub async fn get_attribute(&self, id: &AttributeId) -> Result<Attribute> {
        self.attributes.require_active(id.as_str()).await
    }

    pub async fn list_attributes(&self) -> Result<Vec<Attribute>> {
        self.attributes.query_active(&[]).await
    }

    /// Apply `patch`. The LIST/domain pairing is re-validated on the result;
    /// switching away from LIST drops the domain.
    pub async fn update_attribute(
        &self,
        actor: &Actor,
        id: &AttributeId,
        patch: AttributePatch,
    ) -> Result<Attribute> {
        let mut attribute = self.get_attribute(id).await?;
        if let Some(name) = patch.name {
            let name = required_text("name", &name)?;
            self.ensure_unique(&name, Some(id)).await?;
            attribute.name = name;
        }
        if let Some(description) = patch.description {
            attribute.description = optional_text(Some(description));
        }

        let data_type = patch.data_type.unwrap_or(attribute.data_type);
        let domain_id = if data_type.requires_domain() {
            patch.domain_id.or(attribute.domain_id.take())
        } else {
            patch.domain_id
        };
        attribute.domain_id = self.check_domain(data_type, domain_id.filter(|d| !d.is_empty())).await?;
        attribute.data_type = data_type;

        attribute.updated_at = Some(Utc::now());
        self.attributes.upsert(&attribute).await?;
        tracing::info!(attribute_id = %id, actor = %actor.actor_id, "attribute updated");
        Ok(attribute)
    }

    /// Remove the attribute from every category and subcategory, then soft-delete it.
    ///
    /// The attribute stays active until every mapping is gone, so a failed
    /// call never leaves mappings pointing at a dead attribute. Calling again
    /// resumes the cascade; an already-inactive attribute is a no-op.
    pub async fn deactivate_attribute(&self, actor: &Actor, id: &AttributeId) -> Result<usize> {
        let attribute = self
            .attributes
            .get(id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("attribute", id))?;

        let mut removed = self.resolver.remove_attribute_everywhere(actor, id).await?;
        if attribute.active {
            self.attributes.soft_delete(id.as_str()).await?;
            // Sweep mappings added between the cascade and the flag flip.
            removed += self.resolver.remove_attribute_everywhere(actor, id).await?;
        }
        tracing::info!(attribute_id = %id, mappings_removed = removed, actor = %actor.actor_id, "attribute deactivated");
        Ok(removed)
    }

    /// LIST requires an active domain; any other type must not carry one.
    async fn check_domain(&self, data_type: DataType, domain_id: Option<DomainId>) -> Result<Option<DomainId>> {
        match (data_type.requires_domain(), domain_id) {
            (true, None) => Err(ClassificationError::validation(
                "domain_id",
                "LIST attribute requires domain",
            )),
            (true, Some(domain_id)) => {
                self.domains.require_active(domain_id.as_str()).await?;
                Ok(Some(domain_id))
            }
            (false, Some(domain_id)) => Err(ClassificationError::validation(
                "domain_id",
                format!("{data_type} attribute cannot reference domain '{domain_id}'"),
            )),
            (false, None) => Ok(None),
        }
    }

    async fn ensure_unique(&self, name: &str, except: Option<&AttributeId>) -> Result<()> {
        let existing = self.attributes.query_active(&[]).await?;
        ensure_unique_name(
            "attribute",
            name,
            existing.iter().map(|a| (a.id.as_str(), a.name.as_str())),
            except.map(AttributeId::as_str),
        )
    }
}
