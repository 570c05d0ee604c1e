use std::sync::Arc;

use uuid::Uuid;

use crate::credential::CredentialHasher;
use crate::domain::organization::{ensure_available, ensure_organization_open};
use crate::domain::{audit, require_non_empty, validate_email, validate_password};
use crate::error::{AppError, AppResult};
use crate::models::{Member, NewMember, Role};
use crate::policy::{self, Action, MemberVisibility};
use crate::store::{MemberFilter, Page, Store};

/// Input for registration and for superadmin-issued creation.
#[derive(Debug, Clone)]
pub struct MemberDraft {
    pub email: String,
    pub name: String,
    pub surname: String,
    pub role: Role,
    pub password: String,
}

impl MemberDraft {
    pub fn validate(&self) -> AppResult<()> {
        validate_email(&self.email)?;
        require_non_empty("name", &self.name)?;
        require_non_empty("surname", &self.surname)?;
        validate_password(&self.password)
    }
}

/// Partial update. `None` leaves the field untouched; role is not updatable.
#[derive(Debug, Clone, Default)]
pub struct MemberChanges {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub active: Option<bool>,
}

impl MemberChanges {
    fn validate(&self) -> AppResult<()> {
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        if let Some(surname) = &self.surname {
            require_non_empty("surname", surname)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

fn visibility_filter(visibility: MemberVisibility) -> MemberFilter {
    match visibility {
        MemberVisibility::SelfOnly(id) => MemberFilter::Id(id),
        MemberVisibility::UsersOnly => MemberFilter::RoleIs(Role::User),
        MemberVisibility::AllButSuperadmin => MemberFilter::RoleIsNot(Role::Superadmin),
    }
}

#[derive(Clone)]
pub struct Members {
    store: Arc<dyn Store>,
    hasher: Arc<dyn CredentialHasher>,
}

impl Members {
    pub fn new(store: Arc<dyn Store>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    pub async fn list(&self, actor: &Member, page: Page) -> AppResult<Vec<Member>> {
        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        let filter = visibility_filter(MemberVisibility::for_actor(actor));
        tx.list_members(filter, page).await
    }

    pub async fn get(&self, actor: &Member, id: Uuid) -> AppResult<Member> {
        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        let target = tx
            .member_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;
        policy::can(actor, Action::ViewMember(&target))?;
        Ok(target)
    }

    /// The actor's own record, bypassing the visibility mask. Suspended
    /// members may still read it.
    pub async fn me(&self, actor: &Member) -> AppResult<Member> {
        let mut tx = self.store.begin().await?;
        ensure_organization_open(tx.as_mut(), actor).await?;
        let me = tx.member_by_id(actor.id).await?;
        me.ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }

    pub async fn create(&self, actor: &Member, draft: MemberDraft) -> AppResult<Member> {
        draft.validate()?;

        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        policy::can(actor, Action::CreateMember)?;

        if tx.member_by_email(&draft.email).await?.is_some() {
            return Err(AppError::ValidationConflict(
                "Email already registered".to_string(),
            ));
        }
        if draft.role == Role::Superadmin && tx.member_by_role(Role::Superadmin).await?.is_some() {
            return Err(AppError::ValidationConflict(
                "There can be at most one superadmin in the organization!".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(&draft.password)?;
        let member = tx
            .insert_member(NewMember {
                email: draft.email,
                name: draft.name,
                surname: draft.surname,
                role: draft.role,
                password_hash,
            })
            .await?;
        audit::append(tx.as_mut(), actor, audit::CREATE_MEMBER, member.id).await?;
        tx.commit().await?;

        tracing::info!("Member {} created {} as {}", actor.id, member.id, member.role);
        Ok(member)
    }

    pub async fn update(
        &self,
        actor: &Member,
        id: Uuid,
        changes: MemberChanges,
    ) -> AppResult<Member> {
        changes.validate()?;

        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        policy::can(actor, Action::ReachMember(id))?;
        let target = tx
            .lock_member(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;
        if target.id != actor.id {
            policy::can(actor, Action::ViewMember(&target))?;
        }

        policy::can(actor, Action::UpdateMember(&target))?;
        if let Some(active) = changes.active {
            policy::can(actor, Action::SetActive { target: &target, active })?;
        }

        let mut updated = target.clone();
        if let Some(name) = changes.name {
            updated.name = name;
        }
        if let Some(surname) = changes.surname {
            updated.surname = surname;
        }
        if let Some(email) = changes.email {
            if email != target.email {
                if tx.member_by_email(&email).await?.is_some() {
                    return Err(AppError::ValidationConflict(
                        "Email already registered".to_string(),
                    ));
                }
                updated.email = email;
            }
        }
        if let Some(password) = changes.password {
            updated.password_hash = self.hasher.hash(&password)?;
        }
        match changes.active {
            Some(false) if target.active => {
                updated.active = false;
                updated.suspended_by = Some(actor.id);
            }
            Some(true) if !target.active => {
                updated.active = true;
                updated.suspended_by = None;
            }
            // already in the requested state; suspended_by is kept
            _ => {}
        }

        if updated == target {
            return Ok(target);
        }

        updated.last_updated_by = Some(actor.id);
        let member = tx.update_member(&updated).await?;
        audit::append(tx.as_mut(), actor, audit::UPDATE_MEMBER, member.id).await?;
        tx.commit().await?;

        if member.active != target.active {
            tracing::info!(
                "Member {} set active={} on {}",
                actor.id,
                member.active,
                member.id
            );
        }
        Ok(member)
    }

    pub async fn delete(&self, actor: &Member, id: Uuid) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        ensure_available(tx.as_mut(), actor).await?;
        policy::can(actor, Action::DeleteMembers)?;
        let target = tx
            .lock_member(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;
        policy::can(actor, Action::DeleteMember(&target))?;

        if !tx.delete_member(target.id).await? {
            return Err(AppError::NotFound("Member not found".to_string()));
        }
        audit::append(tx.as_mut(), actor, audit::DELETE_MEMBER, target.id).await?;
        tx.commit().await?;

        tracing::info!("Member {} deleted {}", actor.id, target.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{backend, draft, member, root};
    use crate::domain::{ItemDraft, OrganizationChanges};
    use crate::policy::Denial;
    use crate::store::StoreTx;

    fn suspend() -> MemberChanges {
        MemberChanges {
            active: Some(false),
            ..Default::default()
        }
    }

    fn unsuspend() -> MemberChanges {
        MemberChanges {
            active: Some(true),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admin_cannot_create_members() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "m1@x.com", Role::Admin).await;

        let result = backend.members.create(&admin, draft("new@x.com", Role::User)).await;
        assert!(matches!(
            result,
            Err(AppError::PermissionDenied(Denial::OnlySuperadminCreatesMembers))
        ));
    }

    #[tokio::test]
    async fn test_create_conflicts() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        member(&backend, &root, "u@x.com", Role::User).await;

        let dup = backend.members.create(&root, draft("u@x.com", Role::User)).await;
        assert!(matches!(dup, Err(AppError::ValidationConflict(_))));

        let second_root = backend
            .members
            .create(&root, draft("root2@x.com", Role::Superadmin))
            .await;
        assert!(matches!(second_root, Err(AppError::ValidationConflict(_))));
    }

    #[tokio::test]
    async fn test_list_respects_visibility() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;
        member(&backend, &root, "user2@x.com", Role::User).await;

        let emails = |members: Vec<Member>| -> Vec<String> {
            members.into_iter().map(|m| m.email).collect()
        };

        let seen = emails(backend.members.list(&root, Page::default()).await.unwrap());
        assert_eq!(seen, ["admin@x.com", "user@x.com", "user2@x.com"]);

        let seen = emails(backend.members.list(&admin, Page::default()).await.unwrap());
        assert_eq!(seen, ["user@x.com", "user2@x.com"]);

        let seen = emails(backend.members.list(&user, Page::default()).await.unwrap());
        assert_eq!(seen, ["user@x.com"]);

        let page = backend.members.list(&root, Page::new(1, 1)).await.unwrap();
        assert_eq!(emails(page), ["user@x.com"]);
    }

    #[tokio::test]
    async fn test_get_hides_invisible_members() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let other_admin = member(&backend, &root, "admin2@x.com", Role::Admin).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;
        let other_user = member(&backend, &root, "user2@x.com", Role::User).await;

        assert!(backend.members.get(&admin, user.id).await.is_ok());
        assert!(backend.members.get(&root, admin.id).await.is_ok());
        assert!(backend.members.get(&user, user.id).await.is_ok());

        for (actor, target) in [
            (&admin, other_admin.id),
            (&admin, root.id),
            (&user, other_user.id),
            (&root, root.id),
        ] {
            assert!(matches!(
                backend.members.get(actor, target).await,
                Err(AppError::NotFound(_))
            ));
        }
        assert!(matches!(
            backend.members.get(&root, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_me_always_sees_self() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let me = backend.members.me(&root).await.unwrap();
        assert_eq!(me.id, root.id);
    }

    #[tokio::test]
    async fn test_update_rules() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let other_admin = member(&backend, &root, "admin2@x.com", Role::Admin).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;

        let rename = || MemberChanges {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };

        let updated = backend.members.update(&admin, user.id, rename()).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.last_updated_by, Some(admin.id));

        // members the actor cannot see are not found
        for (actor, target) in [(&admin, other_admin.id), (&admin, root.id), (&user, admin.id)] {
            assert!(matches!(
                backend.members.update(actor, target, rename()).await,
                Err(AppError::NotFound(_))
            ));
        }
        assert!(backend.members.update(&user, user.id, rename()).await.is_ok());
        assert!(backend.members.update(&root, other_admin.id, rename()).await.is_ok());
    }

    #[tokio::test]
    async fn test_denials_do_not_reveal_which_ids_exist() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "admin@x.com", Role::Admin).await;
        let other_admin = member(&backend, &root, "admin2@x.com", Role::Admin).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;
        let absent = Uuid::new_v4();

        let rename = || MemberChanges {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let outcome = |result: AppResult<Member>| match result {
            Err(AppError::NotFound(_)) => "not found",
            other => panic!("unexpected {other:?}"),
        };

        for (actor, hidden) in [(&user, root.id), (&user, admin.id), (&admin, other_admin.id)] {
            let existing = outcome(backend.members.update(actor, hidden, rename()).await);
            let missing = outcome(backend.members.update(actor, absent, rename()).await);
            assert_eq!(existing, missing);
        }

        for actor in [&user, &admin] {
            for id in [root.id, other_admin.id, absent] {
                assert!(matches!(
                    backend.members.delete(actor, id).await,
                    Err(AppError::PermissionDenied(Denial::OnlySuperadminDeletesMembers))
                ));
            }
        }
        assert!(matches!(
            backend.members.delete(&root, absent).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_email_conflict() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;
        member(&backend, &root, "taken@x.com", Role::User).await;

        let result = backend
            .members
            .update(
                &user,
                user.id,
                MemberChanges {
                    email: Some("taken@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::ValidationConflict(_))));
    }

    #[tokio::test]
    async fn test_password_change_allows_new_login() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "user@x.com", Role::User).await;

        backend
            .members
            .update(
                &user,
                user.id,
                MemberChanges {
                    password: Some("new-password-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(backend.identity.authenticate("user@x.com", "new-password-1").await.is_ok());
        assert!(backend
            .identity
            .authenticate("user@x.com", crate::domain::testing::PASSWORD)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_suspension_lifecycle() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin_a = member(&backend, &root, "a@x.com", Role::Admin).await;
        let admin_b = member(&backend, &root, "b@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;

        let suspended = backend.members.update(&admin_a, user.id, suspend()).await.unwrap();
        assert!(!suspended.active);
        assert_eq!(suspended.suspended_by, Some(admin_a.id));

        // a different admin cannot lift someone else's suspension
        assert!(matches!(
            backend.members.update(&admin_b, user.id, unsuspend()).await,
            Err(AppError::PermissionDenied(Denial::NotSuspender))
        ));

        let restored = backend.members.update(&root, user.id, unsuspend()).await.unwrap();
        assert!(restored.active);
        assert_eq!(restored.suspended_by, None);

        // the original suspender may lift their own suspension
        backend.members.update(&admin_a, user.id, suspend()).await.unwrap();
        let restored = backend.members.update(&admin_a, user.id, unsuspend()).await.unwrap();
        assert!(restored.active);
    }

    #[tokio::test]
    async fn test_suspend_is_sticky_to_first_suspender() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "a@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;

        backend.members.update(&admin, user.id, suspend()).await.unwrap();
        let again = backend.members.update(&root, user.id, suspend()).await.unwrap();
        assert_eq!(again.suspended_by, Some(admin.id));
    }

    #[tokio::test]
    async fn test_self_suspension_and_user_toggle_denied() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "a@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;

        assert!(matches!(
            backend.members.update(&root, root.id, suspend()).await,
            Err(AppError::PermissionDenied(Denial::SelfSuspension))
        ));
        assert!(matches!(
            backend.members.update(&admin, admin.id, suspend()).await,
            Err(AppError::PermissionDenied(Denial::SelfSuspension))
        ));
        assert!(matches!(
            backend.members.update(&user, user.id, unsuspend()).await,
            Err(AppError::PermissionDenied(Denial::UserCannotToggleActive))
        ));
    }

    #[tokio::test]
    async fn test_suspended_member_cannot_act() {
        let (backend, store) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "a@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;
        let item = backend
            .items
            .create(
                &user,
                ItemDraft {
                    name: "lamp".to_string(),
                    description: String::new(),
                    price: 1.0,
                },
            )
            .await
            .unwrap();

        backend.members.update(&root, admin.id, suspend()).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let admin = tx.member_by_id(admin.id).await.unwrap().unwrap();
        drop(tx);
        assert!(!admin.active);

        let suspended = |result: Result<(), AppError>| {
            matches!(result, Err(AppError::PermissionDenied(Denial::MemberSuspended)))
        };
        assert!(suspended(backend.items.delete(&admin, item.id).await));
        assert!(suspended(
            backend.members.update(&admin, user.id, suspend()).await.map(|_| ())
        ));
        assert!(suspended(
            backend.audit.list(&admin, Page::default()).await.map(|_| ())
        ));
        assert!(suspended(
            backend.members.list(&admin, Page::default()).await.map(|_| ())
        ));

        // the account itself stays reachable
        assert!(backend
            .identity
            .authenticate("a@x.com", crate::domain::testing::PASSWORD)
            .await
            .is_ok());
        assert_eq!(backend.members.me(&admin).await.unwrap().id, admin.id);

        backend.members.update(&root, admin.id, unsuspend()).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let admin = tx.member_by_id(admin.id).await.unwrap().unwrap();
        drop(tx);
        assert!(backend.items.delete(&admin, item.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_suspensions_agree_on_suspender() {
        let (backend, store) = backend();
        let root = root(&backend).await;
        let admin_a = member(&backend, &root, "a@x.com", Role::Admin).await;
        let admin_b = member(&backend, &root, "b@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;

        let (first, second) = tokio::join!(
            backend.members.update(&admin_a, user.id, suspend()),
            backend.members.update(&admin_b, user.id, suspend()),
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.suspended_by, second.suspended_by);
        let suspender = first.suspended_by.unwrap();
        assert!(suspender == admin_a.id || suspender == admin_b.id);

        let mut tx = store.begin().await.unwrap();
        let stored = tx.member_by_id(user.id).await.unwrap().unwrap();
        drop(tx);
        assert!(!stored.active);
        assert_eq!(stored.suspended_by, Some(suspender));

        let logs = backend.audit.list(&root, Page::new(0, 100)).await.unwrap();
        let updates = logs
            .iter()
            .filter(|l| l.action == audit::UPDATE_MEMBER && l.object_id == user.id)
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_unsuspend_active_member_is_checked_noop() {
        let (backend, store) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "a@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;

        let logs_before = backend.audit.list(&root, Page::new(0, 100)).await.unwrap().len();
        let same = backend.members.update(&admin, user.id, unsuspend()).await.unwrap();
        assert_eq!(same, user);

        let mut tx = store.begin().await.unwrap();
        let stored = tx.member_by_id(user.id).await.unwrap().unwrap();
        drop(tx);
        assert_eq!(stored, user);
        let logs_after = backend.audit.list(&root, Page::new(0, 100)).await.unwrap().len();
        assert_eq!(logs_before, logs_after);

        // still permission-checked
        assert!(matches!(
            backend.members.update(&user, user.id, unsuspend()).await,
            Err(AppError::PermissionDenied(Denial::UserCannotToggleActive))
        ));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "a@x.com", Role::Admin).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;

        assert!(matches!(
            backend.members.delete(&admin, user.id).await,
            Err(AppError::PermissionDenied(Denial::OnlySuperadminDeletesMembers))
        ));
        assert!(matches!(
            backend.members.delete(&root, root.id).await,
            Err(AppError::PermissionDenied(Denial::SuperadminUndeletable))
        ));
        backend.members.delete(&root, admin.id).await.unwrap();
        assert!(matches!(
            backend.members.delete(&root, admin.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_items_and_logs() {
        let (backend, store) = backend();
        let root = root(&backend).await;
        let user = member(&backend, &root, "u@x.com", Role::User).await;
        let item = backend
            .items
            .create(
                &user,
                ItemDraft {
                    name: "lamp".to_string(),
                    description: String::new(),
                    price: 12.0,
                },
            )
            .await
            .unwrap();

        backend.members.delete(&root, user.id).await.unwrap();

        assert!(matches!(
            backend.items.get(&root, item.id).await,
            Err(AppError::NotFound(_))
        ));
        let logs = backend.audit.list(&root, Page::new(0, 100)).await.unwrap();
        assert!(logs.iter().all(|l| l.subject_id != user.id));
        let last = logs.last().unwrap();
        assert_eq!(last.action, audit::DELETE_MEMBER);
        assert_eq!(last.object_id, user.id);

        let mut tx = store.begin().await.unwrap();
        let remaining = tx.list_items(None, Page::new(0, 100)).await.unwrap();
        assert!(remaining.iter().all(|i| i.owner_id != user.id));
    }

    #[tokio::test]
    async fn test_superadmin_count_never_exceeds_one() {
        let (backend, store) = backend();
        let root = root(&backend).await;
        let attempts = [
            backend.identity.register(draft("r2@x.com", Role::Superadmin)).await.is_ok(),
            backend.members.create(&root, draft("r3@x.com", Role::Superadmin)).await.is_ok(),
            backend.identity.register(draft("u@x.com", Role::User)).await.is_ok(),
            backend.identity.register(draft("r4@x.com", Role::Superadmin)).await.is_ok(),
        ];
        assert_eq!(attempts, [false, false, true, false]);

        let mut tx = store.begin().await.unwrap();
        let roots = tx
            .list_members(MemberFilter::RoleIs(Role::Superadmin), Page::new(0, 100))
            .await
            .unwrap();
        assert_eq!(roots.len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_organization_locks_out_non_superadmins() {
        let (backend, _) = backend();
        let root = root(&backend).await;
        let admin = member(&backend, &root, "a@x.com", Role::Admin).await;
        backend.organization.create(&root, "Acme".to_string(), true).await.unwrap();
        backend
            .organization
            .update(
                &root,
                OrganizationChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            backend.members.list(&admin, Page::default()).await,
            Err(AppError::PermissionDenied(Denial::OrganizationInactive))
        ));
        assert!(backend.members.list(&root, Page::default()).await.is_ok());
    }
}
