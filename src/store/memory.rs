use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{MemberFilter, Page, Store, StoreTx};
use crate::error::{AppError, AppResult};
use crate::models::{
    ItemModel, LogEntry, Member, NewItem, NewLogEntry, NewMember, OrganizationModel, Role,
};

#[derive(Debug, Clone, Default)]
struct State {
    members: Vec<Member>,
    items: Vec<ItemModel>,
    logs: Vec<LogEntry>,
    organization: Option<OrganizationModel>,
}

/// Process-local store. Transactions are serialized and work on a copy of the
/// state that replaces the original on commit, so an abandoned transaction
/// leaves nothing behind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

fn paginate<T: Clone>(rows: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    rows.skip(page.skip as usize).take(page.limit as usize).collect()
}

fn owned_by(item: &ItemModel, owner: Option<Uuid>) -> bool {
    owner.map_or(true, |id| item.owner_id == id)
}

impl MemoryTx {
    fn check_member_unique(&self, member: &Member) -> AppResult<()> {
        let others = self.work.members.iter().filter(|m| m.id != member.id);
        for other in others {
            if other.email == member.email {
                return Err(AppError::ValidationConflict(
                    "Email already registered".to_string(),
                ));
            }
            if member.role == Role::Superadmin && other.role == Role::Superadmin {
                return Err(AppError::ValidationConflict(
                    "There can be at most one superadmin in the organization!".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl StoreTx for MemoryTx {
    async fn member_by_id(&mut self, id: Uuid) -> AppResult<Option<Member>> {
        Ok(self.work.members.iter().find(|m| m.id == id).cloned())
    }

    async fn lock_member(&mut self, id: Uuid) -> AppResult<Option<Member>> {
        self.member_by_id(id).await
    }

    async fn member_by_email(&mut self, email: &str) -> AppResult<Option<Member>> {
        Ok(self.work.members.iter().find(|m| m.email == email).cloned())
    }

    async fn member_by_role(&mut self, role: Role) -> AppResult<Option<Member>> {
        Ok(self.work.members.iter().find(|m| m.role == role).cloned())
    }

    async fn list_members(&mut self, filter: MemberFilter, page: Page) -> AppResult<Vec<Member>> {
        let rows = self.work.members.iter().filter(|m| filter.matches(m)).cloned();
        Ok(paginate(rows, page))
    }

    async fn insert_member(&mut self, member: NewMember) -> AppResult<Member> {
        let now = Utc::now();
        let member = Member {
            id: Uuid::new_v4(),
            email: member.email,
            name: member.name,
            surname: member.surname,
            role: member.role,
            password_hash: member.password_hash,
            active: true,
            suspended_by: None,
            last_updated_by: None,
            created_at: now,
            updated_at: now,
        };
        self.check_member_unique(&member)?;
        self.work.members.push(member.clone());
        Ok(member)
    }

    async fn update_member(&mut self, member: &Member) -> AppResult<Member> {
        self.check_member_unique(member)?;
        let slot = self
            .work
            .members
            .iter_mut()
            .find(|m| m.id == member.id)
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;
        *slot = Member {
            role: slot.role,
            created_at: slot.created_at,
            updated_at: Utc::now(),
            ..member.clone()
        };
        Ok(slot.clone())
    }

    async fn delete_member(&mut self, id: Uuid) -> AppResult<bool> {
        let before = self.work.members.len();
        self.work.members.retain(|m| m.id != id);
        if self.work.members.len() == before {
            return Ok(false);
        }
        self.work.items.retain(|i| i.owner_id != id);
        self.work.logs.retain(|l| l.subject_id != id);
        for member in &mut self.work.members {
            if member.suspended_by == Some(id) {
                member.suspended_by = None;
            }
            if member.last_updated_by == Some(id) {
                member.last_updated_by = None;
            }
        }
        Ok(true)
    }

    async fn item_by_id(&mut self, id: Uuid, owner: Option<Uuid>) -> AppResult<Option<ItemModel>> {
        Ok(self
            .work
            .items
            .iter()
            .find(|i| i.id == id && owned_by(i, owner))
            .cloned())
    }

    async fn lock_item(&mut self, id: Uuid, owner: Option<Uuid>) -> AppResult<Option<ItemModel>> {
        self.item_by_id(id, owner).await
    }

    async fn list_items(&mut self, owner: Option<Uuid>, page: Page) -> AppResult<Vec<ItemModel>> {
        let rows = self.work.items.iter().filter(|i| owned_by(i, owner)).cloned();
        Ok(paginate(rows, page))
    }

    async fn insert_item(&mut self, item: NewItem) -> AppResult<ItemModel> {
        if !self.work.members.iter().any(|m| m.id == item.owner_id) {
            return Err(AppError::Internal("Item owner does not exist".to_string()));
        }
        let now = Utc::now();
        let model = ItemModel {
            id: Uuid::new_v4(),
            name: item.name,
            description: item.description,
            price: item.price,
            owner_id: item.owner_id,
            created_at: now,
            updated_at: now,
        };
        self.work.items.push(model.clone());
        Ok(model)
    }

    async fn update_item(&mut self, item: &ItemModel) -> AppResult<ItemModel> {
        let slot = self
            .work
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| AppError::NotFound("Item not found".to_string()))?;
        slot.name = item.name.clone();
        slot.description = item.description.clone();
        slot.price = item.price;
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }

    async fn delete_item(&mut self, id: Uuid) -> AppResult<bool> {
        let before = self.work.items.len();
        self.work.items.retain(|i| i.id != id);
        Ok(self.work.items.len() < before)
    }

    async fn insert_log(&mut self, entry: NewLogEntry) -> AppResult<LogEntry> {
        let log = LogEntry {
            id: Uuid::new_v4(),
            subject_id: entry.subject_id,
            subject_email: entry.subject_email,
            object_id: entry.object_id,
            action: entry.action,
            created_at: Utc::now(),
        };
        self.work.logs.push(log.clone());
        Ok(log)
    }

    async fn list_logs(&mut self, page: Page) -> AppResult<Vec<LogEntry>> {
        Ok(paginate(self.work.logs.iter().cloned(), page))
    }

    async fn organization(&mut self) -> AppResult<Option<OrganizationModel>> {
        Ok(self.work.organization.clone())
    }

    async fn lock_organization(&mut self) -> AppResult<Option<OrganizationModel>> {
        self.organization().await
    }

    async fn insert_organization(
        &mut self,
        name: &str,
        is_active: bool,
    ) -> AppResult<OrganizationModel> {
        if self.work.organization.is_some() {
            return Err(AppError::ValidationConflict(
                "Organization already exists".to_string(),
            ));
        }
        let org = OrganizationModel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_active,
        };
        self.work.organization = Some(org.clone());
        Ok(org)
    }

    async fn update_organization(
        &mut self,
        organization: &OrganizationModel,
    ) -> AppResult<OrganizationModel> {
        match self.work.organization.as_mut() {
            Some(org) if org.id == organization.id => {
                org.name = organization.name.clone();
                org.is_active = organization.is_active;
                Ok(org.clone())
            }
            _ => Err(AppError::NotFound("Organization not found".to_string())),
        }
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_member(email: &str, role: Role) -> NewMember {
        NewMember {
            email: email.to_string(),
            name: "Name".to_string(),
            surname: "Surname".to_string(),
            role,
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_member(new_member("a@x.com", Role::User)).await.unwrap();
            // dropped without commit
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.member_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_member(new_member("root@x.com", Role::Superadmin)).await.unwrap();

        let dup_email = tx.insert_member(new_member("root@x.com", Role::User)).await;
        assert!(matches!(dup_email, Err(AppError::ValidationConflict(_))));

        let second_root = tx.insert_member(new_member("b@x.com", Role::Superadmin)).await;
        assert!(matches!(second_root, Err(AppError::ValidationConflict(_))));

        tx.insert_organization("Acme", true).await.unwrap();
        let second_org = tx.insert_organization("Other", true).await;
        assert!(matches!(second_org, Err(AppError::ValidationConflict(_))));
    }

    #[tokio::test]
    async fn test_delete_member_cascades() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let root = tx.insert_member(new_member("root@x.com", Role::Superadmin)).await.unwrap();
        let mut user = tx.insert_member(new_member("u@x.com", Role::User)).await.unwrap();
        let mut other = tx.insert_member(new_member("o@x.com", Role::User)).await.unwrap();

        let item = tx
            .insert_item(NewItem {
                name: "thing".to_string(),
                description: String::new(),
                price: 3.5,
                owner_id: user.id,
            })
            .await
            .unwrap();
        tx.insert_log(NewLogEntry {
            subject_id: user.id,
            subject_email: user.email.clone(),
            object_id: item.id,
            action: "create item".to_string(),
        })
        .await
        .unwrap();
        tx.insert_log(NewLogEntry {
            subject_id: root.id,
            subject_email: root.email.clone(),
            object_id: user.id,
            action: "update member".to_string(),
        })
        .await
        .unwrap();

        user.active = false;
        tx.update_member(&user).await.unwrap();
        other.last_updated_by = Some(user.id);
        other.suspended_by = Some(user.id);
        tx.update_member(&other).await.unwrap();

        assert!(tx.delete_member(user.id).await.unwrap());
        assert!(!tx.delete_member(user.id).await.unwrap());

        assert!(tx.item_by_id(item.id, None).await.unwrap().is_none());
        let logs = tx.list_logs(Page::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].subject_id, root.id);

        let other = tx.member_by_id(other.id).await.unwrap().unwrap();
        assert_eq!(other.suspended_by, None);
        assert_eq!(other.last_updated_by, None);
    }

    #[tokio::test]
    async fn test_item_owner_filter() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = tx.insert_member(new_member("a@x.com", Role::User)).await.unwrap();
        let b = tx.insert_member(new_member("b@x.com", Role::User)).await.unwrap();
        let item = tx
            .insert_item(NewItem {
                name: "a's".to_string(),
                description: String::new(),
                price: 0.0,
                owner_id: a.id,
            })
            .await
            .unwrap();

        assert!(tx.item_by_id(item.id, Some(a.id)).await.unwrap().is_some());
        assert!(tx.item_by_id(item.id, Some(b.id)).await.unwrap().is_none());
        assert_eq!(tx.list_items(Some(b.id), Page::default()).await.unwrap().len(), 0);
        assert_eq!(tx.list_items(None, Page::default()).await.unwrap().len(), 1);
    }
}
