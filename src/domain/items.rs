use std::sync::Arc;

use uuid::Uuid;

use crate::domain::organization::ensure_available;
use crate::domain::{audit, require_non_empty};
use crate::error::{AppError, AppResult};
use crate::models::{ItemModel, Member, NewItem};
use crate::policy::{self, Action, ItemScope};
use crate::store::{Page, Store};

#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub name: String,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
}

fn validate_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "price must be a non-negative number, got {}",
            price
        )));
    }
    Ok(())
}

fn not_found() -> AppError {
    AppError::NotFound("Item not found".to_string())
}

#[derive(Clone)]
pub struct Items {
    store: Arc<dyn Store>,
}

impl Items {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, actor: &Member, page: Page) -> AppResult<Vec<ItemModel>> {
        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        let owner = ItemScope::for_actor(actor).owner_filter();
        tx.list_items(owner, page).await
    }

    pub async fn get(&self, actor: &Member, id: Uuid) -> AppResult<ItemModel> {
        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        let owner = ItemScope::for_actor(actor).owner_filter();
        let item = tx.item_by_id(id, owner).await?.ok_or_else(not_found)?;
        policy::can(actor, Action::ViewItem(&item))?;
        Ok(item)
    }

    pub async fn create(&self, actor: &Member, draft: ItemDraft) -> AppResult<ItemModel> {
        require_non_empty("name", &draft.name)?;
        validate_price(draft.price)?;

        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        policy::can(actor, Action::CreateItem)?;

        let item = tx
            .insert_item(NewItem {
                name: draft.name,
                description: draft.description,
                price: draft.price,
                owner_id: actor.id,
            })
            .await?;
        audit::append(tx.as_mut(), actor, audit::CREATE_ITEM, item.id).await?;
        tx.commit().await?;

        tracing::debug!("Member {} created item {}", actor.id, item.id);
        Ok(item)
    }

    pub async fn update(
        &self,
        actor: &Member,
        id: Uuid,
        changes: ItemChanges,
    ) -> AppResult<ItemModel> {
        if let Some(name) = &changes.name {
            require_non_empty("name", name)?;
        }
        if let Some(price) = changes.price {
            validate_price(price)?;
        }

        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        policy::can(actor, Action::UpdateItem)?;
        let current = tx.lock_item(id, None).await?.ok_or_else(not_found)?;

        let mut updated = current.clone();
        if let Some(name) = changes.name {
            updated.name = name;
        }
        if let Some(description) = changes.description {
            updated.description = description;
        }
        if let Some(price) = changes.price {
            updated.price = price;
        }
        if updated == current {
            return Ok(current);
        }

        let item = tx.update_item(&updated).await?;
        audit::append(tx.as_mut(), actor, audit::UPDATE_ITEM, item.id).await?;
        tx.commit().await?;
        Ok(item)
    }

    pub async fn delete(&self, actor: &Member, id: Uuid) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        let owner = ItemScope::for_actor(actor).owner_filter();
        let item = tx.lock_item(id, owner).await?.ok_or_else(not_found)?;
        policy::can(actor, Action::DeleteItem(&item))?;

        if !tx.delete_item(item.id).await? {
            return Err(not_found());
        }
        audit::append(tx.as_mut(), actor, audit::DELETE_ITEM, item.id).await?;
        tx.commit().await?;

        tracing::debug!("Member {} deleted item {}", actor.id, item.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{backend, member, root};
    use crate::models::Role;
    use crate::policy::Denial;

    fn lamp() -> ItemDraft {
        ItemDraft {
            name: "lamp".to_string(),
            description: "desk lamp".to_string(),
            price: 19.5,
        }
    }

    #[tokio::test]
    async fn test_ownership_scope() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let owner = member(&backend, &root, "u@x.com", Role::User).await;
        let stranger = member(&backend, &root, "u2@x.com", Role::User).await;

        let item = backend.items.create(&owner, lamp()).await.unwrap();
        assert_eq!(item.owner_id, owner.id);

        let updated = backend
            .items
            .update(
                &admin,
                item.id,
                ItemChanges {
                    price: Some(25.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price, 25.0);

        // hidden rather than forbidden
        assert!(matches!(
            backend.items.get(&stranger, item.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            backend.items.delete(&stranger, item.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(backend.items.get(&owner, item.id).await.unwrap().price, 25.0);
    }

    #[tokio::test]
    async fn test_create_rules() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;

        assert!(matches!(
            backend.items.create(&admin, lamp()).await,
            Err(AppError::PermissionDenied(Denial::AdminCannotCreateItems))
        ));
        assert!(backend.items.create(&root, lamp()).await.is_ok());

        for price in [-1.0, f64::NAN, f64::INFINITY] {
            let draft = ItemDraft { price, ..lamp() };
            assert!(matches!(
                backend.items.create(&root, draft).await,
                Err(AppError::InvalidInput(_))
            ));
        }
        let unnamed = ItemDraft {
            name: " ".to_string(),
            ..lamp()
        };
        assert!(matches!(
            backend.items.create(&root, unnamed).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_user_cannot_update_even_own_item() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;
        let item = backend.items.create(&user, lamp()).await.unwrap();

        let result = backend
            .items
            .update(
                &user,
                item.id,
                ItemChanges {
                    name: Some("lantern".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(AppError::PermissionDenied(Denial::UserCannotUpdateItems))
        ));
    }

    #[tokio::test]
    async fn test_list_is_scoped() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let a = member(&backend, &root, "a@x.com", Role::User).await;
        let b = member(&backend, &root, "b@x.com", Role::User).await;
        backend.items.create(&a, lamp()).await.unwrap();
        backend.items.create(&b, lamp()).await.unwrap();
        backend.items.create(&b, lamp()).await.unwrap();

        assert_eq!(backend.items.list(&admin, Page::default()).await.unwrap().len(), 3);
        assert_eq!(backend.items.list(&a, Page::default()).await.unwrap().len(), 1);
        let mine = backend.items.list(&b, Page::default()).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|i| i.owner_id == b.id));
    }

    #[tokio::test]
    async fn test_mutations_are_logged() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;
        let item = backend.items.create(&user, lamp()).await.unwrap();
        backend
            .items
            .update(
                &root,
                item.id,
                ItemChanges {
                    description: Some("brass".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        backend.items.delete(&user, item.id).await.unwrap();

        let logs = backend.audit.list(&root, Page::new(0, 100)).await.unwrap();
        let trail: Vec<_> = logs
            .iter()
            .filter(|l| l.object_id == item.id)
            .map(|l| (l.action.as_str(), l.subject_id))
            .collect();
        assert_eq!(
            trail,
            [
                (audit::CREATE_ITEM, user.id),
                (audit::UPDATE_ITEM, root.id),
                (audit::DELETE_ITEM, user.id),
            ]
        );
        assert!(matches!(
            backend.items.get(&root, item.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
