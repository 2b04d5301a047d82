//! Category/subcategory registry.
//!
//! Two levels only: every subcategory belongs to exactly one category.
//! Deactivating a category deactivates its subcategories first, so a failed
//! cascade leaves the category active and a second call finishes the job.

use std::sync::Arc;

use chrono::Utc;

use classification_types::{Category, CategoryId, CategoryPatch, Subcategory, SubcategoryId, SubcategoryPatch};

use crate::domains::{optional_text, required_text};
use crate::error::{ClassificationError, Result};
use crate::principal::Actor;
use crate::store::{DocumentStore, Filter, Repository};

#[derive(Clone)]
pub struct Registry {
    categories: Repository<Category>,
    subcategories: Repository<Subcategory>,
}

impl Registry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            categories: Repository::new(Arc::clone(&store)),
            subcategories: Repository::new(store),
        }
    }

    // ── Categories ─────────────────────────────────────────────

    pub async fn create_category(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<String>,
    ) -> Result<Category> {
        let name = required_text("name", name)?;
        let siblings = self.categories.query_active(&[]).await?;
        ensure_unique_name("category", &name, siblings.iter().map(|c| (c.id.as_str(), c.name.as_str())), None)?;

        let category = Category {
            id: CategoryId::generate(),
            name,
            description: optional_text(description),
            active: true,
            created_at: Utc::now(),
            created_by: actor.actor_id.clone(),
            updated_at: None,
        };
        self.categories.insert(&category).await?;
        tracing::info!(category_id = %category.id, actor = %actor.actor_id, "category created");
        Ok(category)
    }

    pub async fn get_category(&self, id: &CategoryId) -> Result<Category> {
        self.categories.require_active(id.as_str()).await
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.categories.query_active(&[]).await
    }

    pub async fn update_category(
        &self,
        actor: &Actor,
        id: &CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category> {
        let mut category = self.get_category(id).await?;
        if let Some(name) = patch.name {
            let name = required_text("name", &name)?;
            let siblings = self.categories.query_active(&[]).await?;
            ensure_unique_name(
                "category",
                &name,
                siblings.iter().map(|c| (c.id.as_str(), c.name.as_str())),
                Some(id.as_str()),
            )?;
            category.name = name;
        }
        if let Some(description) = patch.description {
            category.description = optional_text(Some(description));
        }
        category.updated_at = Some(Utc::now());
        self.categories.upsert(&category).await?;
        tracing::info!(category_id = %id, actor = %actor.actor_id, "category updated");
        Ok(category)
    }

    /// Soft-deletes the category and all of its active subcategories.
    ///
    /// Returns the number of subcategories deactivated by this call. Mappings
    /// are left in place.
    pub async fn deactivate_category(&self, actor: &Actor, id: &CategoryId) -> Result<usize> {
        let category = self
            .categories
            .get(id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("category", id))?;

        let children = self
            .subcategories
            .query_active(&[Filter::eq("category_id", id.as_str())])
            .await?;
        for child in &children {
            self.subcategories.soft_delete(child.id.as_str()).await?;
        }

        if category.active {
            self.categories.soft_delete(id.as_str()).await?;
        }
        tracing::info!(
            category_id = %id,
            subcategories = children.len(),
            actor = %actor.actor_id,
            "category deactivated"
        );
        Ok(children.len())
    }

    // ── Subcategories ──────────────────────────────────────────

    pub async fn create_subcategory(
        &self,
        actor: &Actor,
        category_id: &CategoryId,
        name: &str,
        description: Option<String>,
    ) -> Result<Subcategory> {
        let name = required_text("name", name)?;
        self.get_category(category_id).await?;
        self.ensure_unique_subcategory(category_id, &name, None).await?;

        let sub = Subcategory {
            id: SubcategoryId::generate(),
            category_id: category_id.clone(),
            name,
            description: optional_text(description),
            active: true,
            created_at: Utc::now(),
            created_by: actor.actor_id.clone(),
            updated_at: None,
        };
        self.subcategories.insert(&sub).await?;
        tracing::info!(
            subcategory_id = %sub.id,
            category_id = %category_id,
            actor = %actor.actor_id,
            "subcategory created"
        );
        Ok(sub)
    }

    pub async fn get_subcategory(&self, id: &SubcategoryId) -> Result<Subcategory> {
        self.subcategories.require_active(id.as_str()).await
    }

    /// Active subcategories of an active category.
    pub async fn list_subcategories(&self, category_id: &CategoryId) -> Result<Vec<Subcategory>> {
        self.get_category(category_id).await?;
        self.subcategories
            .query_active(&[Filter::eq("category_id", category_id.as_str())])
            .await
    }

    pub async fn update_subcategory(
        &self,
        actor: &Actor,
        id: &SubcategoryId,
        patch: SubcategoryPatch,
    ) -> Result<Subcategory> {
        let mut sub = self.get_subcategory(id).await?;
        if let Some(category_id) = patch.category_id {
            self.get_category(&category_id).await?;
            sub.category_id = category_id;
        }
        if let Some(name) = patch.name {
            sub.name = required_text("name", &name)?;
        }
        // Re-checked on move too: the name must be free under the new parent.
        self.ensure_unique_subcategory(&sub.category_id, &sub.name, Some(id))
            .await?;
        if let Some(description) = patch.description {
            sub.description = optional_text(Some(description));
        }
        sub.updated_at = Some(Utc::now());
        self.subcategories.upsert(&sub).await?;
        tracing::info!(subcategory_id = %id, actor = %actor.actor_id, "subcategory updated");
        Ok(sub)
    }

    /// Soft delete; no further cascade. Already-inactive is a no-op.
    pub async fn deactivate_subcategory(&self, actor: &Actor, id: &SubcategoryId) -> Result<()> {
        let sub = self
            .subcategories
            .get(id.as_str())
            .await?
            .ok_or_else(|| ClassificationError::not_found("subcategory", id))?;
        if sub.active {
            self.subcategories.soft_delete(id.as_str()).await?;
            tracing::info!(subcategory_id = %id, actor = %actor.actor_id, "subcategory deactivated");
        }
        Ok(())
    }

    async fn ensure_unique_subcategory(
        &self,
        category_id: &CategoryId,
        name: &str,
        except: Option<&SubcategoryId>,
    ) -> Result<()> {
        let siblings = self
            .subcategories
            .query_active(&[Filter::eq("category_id", category_id.as_str())])
            .await?;
        ensure_unique_name(
            "subcategory",
            name,
            siblings.iter().map(|s| (s.id.as_str(), s.name.as_str())),
            except.map(SubcategoryId::as_str),
        )
    }
}

/// `Conflict` if `name` (case-insensitive) is taken by any sibling other than `except`.
pub(crate) fn ensure_unique_name<'a>(
    kind: &str,
    name: &str,
    siblings: impl IntoIterator<Item = (&'a str, &'a str)>,
    except: Option<&str>,
) -> Result<()> {
    let wanted = name.trim().to_lowercase();
    let taken = siblings
        .into_iter()
        .filter(|(id, _)| Some(*id) != except)
        .any(|(_, existing)| existing.trim().to_lowercase() == wanted);
    if taken {
        return Err(ClassificationError::Conflict(format!(
            "{kind} named '{name}' already exists"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;

    fn registry() -> Registry {
        Registry::new(Arc::new(InMemoryDocumentStore::new()))
    }

    fn admin() -> Actor {
        Actor::system()
    }

    #[tokio::test]
    async fn create_category_rejects_blank_name() {
        let err = registry().create_category(&admin(), " ", None).await.unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[tokio::test]
    async fn category_names_unique_among_active() {
        let reg = registry();
        let anillos = reg.create_category(&admin(), "Anillos", None).await.unwrap();
        let err = reg.create_category(&admin(), "anillos ", None).await.unwrap_err();
        assert!(matches!(err, ClassificationError::Conflict(_)));

        reg.deactivate_category(&admin(), &anillos.id).await.unwrap();
        reg.create_category(&admin(), "Anillos", None).await.unwrap();
    }

    #[tokio::test]
    async fn subcategory_requires_active_parent() {
        let reg = registry();
        let err = reg
            .create_subcategory(&admin(), &CategoryId::new("cat_missing"), "Solitario", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::NotFound(_)));

        let cat = reg.create_category(&admin(), "Anillos", None).await.unwrap();
        reg.deactivate_category(&admin(), &cat.id).await.unwrap();
        let err = reg
            .create_subcategory(&admin(), &cat.id, "Solitario", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::NotFound(_)));
    }

    #[tokio::test]
    async fn subcategory_names_scoped_to_parent() {
        let reg = registry();
        let anillos = reg.create_category(&admin(), "Anillos", None).await.unwrap();
        let aretes = reg.create_category(&admin(), "Aretes", None).await.unwrap();
        reg.create_subcategory(&admin(), &anillos.id, "Oro", None).await.unwrap();
        reg.create_subcategory(&admin(), &aretes.id, "Oro", None).await.unwrap();
        let err = reg
            .create_subcategory(&admin(), &anillos.id, "ORO", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivate_category_cascades_to_subcategories() {
        let reg = registry();
        let cat = reg.create_category(&admin(), "Anillos", None).await.unwrap();
        let a = reg.create_subcategory(&admin(), &cat.id, "Solitario", None).await.unwrap();
        let b = reg.create_subcategory(&admin(), &cat.id, "Churumbela", None).await.unwrap();

        assert_eq!(reg.deactivate_category(&admin(), &cat.id).await.unwrap(), 2);
        assert!(reg.get_subcategory(&a.id).await.is_err());
        assert!(reg.get_subcategory(&b.id).await.is_err());
        assert!(reg.get_category(&cat.id).await.is_err());

        // Idempotent.
        assert_eq!(reg.deactivate_category(&admin(), &cat.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deactivate_missing_category_is_not_found() {
        let err = registry()
            .deactivate_category(&admin(), &CategoryId::new("cat_x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_cascade_leaves_category_active() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let reg = Registry::new(store.clone());
        let cat = reg.create_category(&admin(), "Anillos", None).await.unwrap();
        reg.create_subcategory(&admin(), &cat.id, "Solitario", None).await.unwrap();

        store.fail_next_writes(1);
        assert!(reg.deactivate_category(&admin(), &cat.id).await.is_err());
        assert!(reg.get_category(&cat.id).await.is_ok());

        assert_eq!(reg.deactivate_category(&admin(), &cat.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn move_subcategory_rechecks_names() {
        let reg = registry();
        let anillos = reg.create_category(&admin(), "Anillos", None).await.unwrap();
        let dijes = reg.create_category(&admin(), "Dijes", None).await.unwrap();
        let sol = reg.create_subcategory(&admin(), &anillos.id, "Corazón", None).await.unwrap();
        reg.create_subcategory(&admin(), &dijes.id, "Corazón", None).await.unwrap();

        let err = reg
            .update_subcategory(
                &admin(),
                &sol.id,
                SubcategoryPatch {
                    category_id: Some(dijes.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::Conflict(_)));

        let moved = reg
            .update_subcategory(
                &admin(),
                &sol.id,
                SubcategoryPatch {
                    category_id: Some(dijes.id.clone()),
                    name: Some("Corazón calado".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.category_id, dijes.id);
        assert_eq!(reg.list_subcategories(&dijes.id).await.unwrap().len(), 2);
        assert!(reg.list_subcategories(&anillos.id).await.unwrap().is_empty());
    }
}
