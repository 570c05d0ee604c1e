use std::sync::Arc;

use crate::domain::{audit, require_non_empty};
use crate::error::{AppError, AppResult};
use crate::models::{Member, OrganizationModel};
use crate::policy::{self, Action};
use crate::store::{Store, StoreTx};

/// Refuses suspended members, and non-superadmins while the organization is
/// switched off.
pub(crate) async fn ensure_available(tx: &mut dyn StoreTx, actor: &Member) -> AppResult<()> {
    policy::suspension_gate(actor)?;
    ensure_organization_open(tx, actor).await
}

pub(crate) async fn ensure_organization_open(
    tx: &mut dyn StoreTx,
    actor: &Member,
) -> AppResult<()> {
    if actor.is_superadmin() {
        return Ok(());
    }
    let organization = tx.organization().await?;
    policy::organization_gate(actor, organization.as_ref())?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationChanges {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct Organizations {
    store: Arc<dyn Store>,
}

impl Organizations {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        actor: &Member,
        name: String,
        is_active: bool,
    ) -> AppResult<OrganizationModel> {
        let mut tx = self.store.begin().await?;
        // an existing row wins over the role check
        if tx.lock_organization().await?.is_some() {
            return Err(AppError::ValidationConflict(
                "Organization already exists".to_string(),
            ));
        }
        policy::can(actor, Action::ManageOrganization)?;
        require_non_empty("name", &name)?;

        let organization = tx.insert_organization(&name, is_active).await?;
        audit::append(
            tx.as_mut(),
            actor,
            audit::CREATE_ORGANIZATION,
            organization.id,
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Organization {} created by {}", organization.id, actor.id);
        Ok(organization)
    }

    /// Readable by every authenticated member, even while inactive.
    pub async fn get(&self, _actor: &Member) -> AppResult<OrganizationModel> {
        let mut tx = self.store.begin().await?;
        let organization = tx.organization().await?;
        organization.ok_or_else(|| AppError::NotFound("Organization not found".to_string()))
    }

    pub async fn update(
        &self,
        actor: &Member,
        changes: OrganizationChanges,
    ) -> AppResult<OrganizationModel> {
        if let Some(name) = &changes.name {
            require_non_empty("name", name)?;
        }

        let mut tx = self.store.begin().await?;
        policy::can(actor, Action::ManageOrganization)?;
        let current = tx
            .lock_organization()
            .await?
            .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))?;

        let updated = OrganizationModel {
            name: changes.name.unwrap_or_else(|| current.name.clone()),
            is_active: changes.is_active.unwrap_or(current.is_active),
            ..current.clone()
        };
        if updated == current {
            return Ok(current);
        }

        let organization = tx.update_organization(&updated).await?;
        audit::append(
            tx.as_mut(),
            actor,
            audit::UPDATE_ORGANIZATION,
            organization.id,
        )
        .await?;
        tx.commit().await?;

        if organization.is_active != current.is_active {
            tracing::warn!(
                "Organization {} is_active={} set by {}",
                organization.id,
                organization.is_active,
                actor.id
            );
        }
        Ok(organization)
    }
}
