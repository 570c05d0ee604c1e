use std::sync::Arc;

use uuid::Uuid;

use crate::domain::organization::ensure_available;
use crate::error::AppResult;
use crate::models::{LogEntry, Member, NewLogEntry};
use crate::policy::{self, Action};
use crate::store::{Page, Store, StoreTx};

pub const CREATE_MEMBER: &str = "create member";
pub const UPDATE_MEMBER: &str = "update member";
pub const DELETE_MEMBER: &str = "delete member";
pub const CREATE_ITEM: &str = "create item";
pub const UPDATE_ITEM: &str = "update item";
pub const DELETE_ITEM: &str = "delete item";
pub const CREATE_ORGANIZATION: &str = "create organization";
pub const UPDATE_ORGANIZATION: &str = "update organization";

/// Records `action` inside the caller's transaction, so the entry commits or
/// rolls back together with the mutation it describes.
pub async fn append(
    tx: &mut dyn StoreTx,
    subject: &Member,
    action: &str,
    object_id: Uuid,
) -> AppResult<LogEntry> {
    tx.insert_log(NewLogEntry {
        subject_id: subject.id,
        subject_email: subject.email.clone(),
        object_id,
        action: action.to_string(),
    })
    .await
}

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn Store>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, actor: &Member, page: Page) -> AppResult<Vec<LogEntry>> {
        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        policy::can(actor, Action::ViewLogs)?;
        tx.list_logs(page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{backend, draft, member, root};
    use crate::domain::MemberChanges;
    use crate::error::AppError;
    use crate::models::Role;
    use crate::policy::Denial;

    #[tokio::test]
    async fn test_list_requires_admin() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;

        assert!(backend.audit.list(&root, Page::default()).await.is_ok());
        assert!(backend.audit.list(&admin, Page::default()).await.is_ok());
        assert!(matches!(
            backend.audit.list(&user, Page::default()).await,
            Err(AppError::PermissionDenied(Denial::UserCannotViewLogs))
        ));
    }

    #[tokio::test]
    async fn test_entries_in_insertion_order() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;
        backend
            .members
            .update(
                &root,
                user.id,
                MemberChanges {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let logs = backend.audit.list(&root, Page::default()).await.unwrap();
        let actions: Vec<_> = logs.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(actions, [CREATE_MEMBER, CREATE_MEMBER, UPDATE_MEMBER]);
        assert_eq!(logs[0].object_id, root.id);
        assert_eq!(logs[1].subject_id, root.id);
        assert_eq!(logs[1].object_id, user.id);

        let page = backend.audit.list(&root, Page::new(1, 1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, logs[1].id);
    }

    #[tokio::test]
    async fn test_subject_email_is_a_snapshot() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let user = backend
            .members
            .create(&root, draft("user@x.com", Role::User))
            .await
            .unwrap();

        backend
            .members
            .update(
                &admin,
                user.id,
                MemberChanges {
                    surname: Some("Changed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let renamed = backend
            .members
            .update(
                &admin,
                admin.id,
                MemberChanges {
                    email: Some("renamed-admin@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        backend
            .members
            .update(
                &renamed,
                user.id,
                MemberChanges {
                    surname: Some("Again".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let logs = backend.audit.list(&root, Page::default()).await.unwrap();
        let by_admin: Vec<_> = logs.iter().filter(|l| l.subject_id == admin.id).collect();
        assert_eq!(by_admin.len(), 3);
        assert_eq!(by_admin[0].subject_email, "admin@x.com");
        assert_eq!(by_admin[2].subject_email, "renamed-admin@x.com");
    }
}
