//! Role-based authorization decisions.
//!
//! Everything here is pure: callers load the actor and target, ask [`can`],
//! and only then touch the store. A denial carries a distinct reason per rule
//! so logs can tell rules apart even where the transport collapses them.

use std::fmt;

use uuid::Uuid;

use crate::models::{ItemModel, Member, OrganizationModel, Role};

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Target member lies outside the actor's visibility mask.
    MemberHidden,
    /// Target item lies outside the actor's ownership scope.
    ItemHidden,
    OnlySuperadminCreatesMembers,
    OnlySuperadminDeletesMembers,
    SuperadminUndeletable,
    UserUpdatesSelfOnly,
    AdminUpdatesUsersOnly,
    UserCannotToggleActive,
    SelfSuspension,
    NotSuspender,
    AdminCannotCreateItems,
    UserCannotUpdateItems,
    UserCannotViewLogs,
    OnlySuperadminManagesOrganization,
    OrganizationInactive,
    MemberSuspended,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::MemberHidden => "member is not visible to the actor",
            Denial::ItemHidden => "item is not visible to the actor",
            Denial::OnlySuperadminCreatesMembers => "only the superadmin can create members",
            Denial::OnlySuperadminDeletesMembers => "only the superadmin can delete members",
            Denial::SuperadminUndeletable => "the superadmin cannot be deleted",
            Denial::UserUpdatesSelfOnly => "users can only update themselves",
            Denial::AdminUpdatesUsersOnly => "admins can only update users",
            Denial::UserCannotToggleActive => "users cannot suspend or unsuspend members",
            Denial::SelfSuspension => "members cannot suspend themselves",
            Denial::NotSuspender => {
                "only the suspending member or the superadmin can unsuspend"
            }
            Denial::AdminCannotCreateItems => "admins cannot create items",
            Denial::UserCannotUpdateItems => "users cannot update items",
            Denial::UserCannotViewLogs => "users cannot view logs",
            Denial::OnlySuperadminManagesOrganization => {
                "only the superadmin can manage the organization"
            }
            Denial::OrganizationInactive => "the organization is inactive",
            Denial::MemberSuspended => "suspended members cannot act",
        }
    }

    /// Masked denials must surface as "not found" so existence is not leaked.
    pub fn is_masked(&self) -> bool {
        matches!(self, Denial::MemberHidden | Denial::ItemHidden)
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl std::error::Error for Denial {}

pub type Decision = Result<(), Denial>;

/// Which members an actor may learn exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberVisibility {
    SelfOnly(Uuid),
    UsersOnly,
    AllButSuperadmin,
}

impl MemberVisibility {
    pub fn for_actor(actor: &Member) -> Self {
        match actor.role {
            Role::User => MemberVisibility::SelfOnly(actor.id),
            Role::Admin => MemberVisibility::UsersOnly,
            Role::Superadmin => MemberVisibility::AllButSuperadmin,
        }
    }

    pub fn admits(&self, target: &Member) -> bool {
        match self {
            MemberVisibility::SelfOnly(id) => target.id == *id,
            MemberVisibility::UsersOnly => target.role == Role::User,
            MemberVisibility::AllButSuperadmin => target.role != Role::Superadmin,
        }
    }
}

/// Which items an actor may read or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemScope {
    All,
    OwnedBy(Uuid),
}

impl ItemScope {
    pub fn for_actor(actor: &Member) -> Self {
        match actor.role {
            Role::Superadmin | Role::Admin => ItemScope::All,
            Role::User => ItemScope::OwnedBy(actor.id),
        }
    }

    pub fn owner_filter(&self) -> Option<Uuid> {
        match self {
            ItemScope::All => None,
            ItemScope::OwnedBy(id) => Some(*id),
        }
    }

    pub fn admits(&self, item: &ItemModel) -> bool {
        match self {
            ItemScope::All => true,
            ItemScope::OwnedBy(id) => item.owner_id == *id,
        }
    }
}

/// An action an actor wants to perform, with its target where one exists.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// Any by-id member operation, decided before the row is looked up.
    ReachMember(Uuid),
    ViewMember(&'a Member),
    CreateMember,
    UpdateMember(&'a Member),
    /// Toggle of the `active` flag, checked on top of `UpdateMember`.
    SetActive { target: &'a Member, active: bool },
    /// Role gate for deletion, decided before the row is looked up.
    DeleteMembers,
    DeleteMember(&'a Member),
    CreateItem,
    ViewItem(&'a ItemModel),
    UpdateItem,
    DeleteItem(&'a ItemModel),
    ViewLogs,
    ManageOrganization,
}

pub fn can(actor: &Member, action: Action<'_>) -> Decision {
    match action {
        Action::ReachMember(id) => match actor.role {
            Role::User if actor.id != id => Err(Denial::MemberHidden),
            _ => Ok(()),
        },
        Action::ViewMember(target) => {
            if MemberVisibility::for_actor(actor).admits(target) {
                Ok(())
            } else {
                Err(Denial::MemberHidden)
            }
        }
        Action::CreateMember => require_superadmin(actor, Denial::OnlySuperadminCreatesMembers),
        Action::UpdateMember(target) => can_update_member(actor, target),
        Action::SetActive { target, active } => {
            can_update_member(actor, target)?;
            can_set_active(actor, target, active)
        }
        Action::DeleteMembers => {
            require_superadmin(actor, Denial::OnlySuperadminDeletesMembers)
        }
        Action::DeleteMember(target) => {
            require_superadmin(actor, Denial::OnlySuperadminDeletesMembers)?;
            if target.is_superadmin() {
                return Err(Denial::SuperadminUndeletable);
            }
            Ok(())
        }
        Action::CreateItem => match actor.role {
            Role::Admin => Err(Denial::AdminCannotCreateItems),
            Role::Superadmin | Role::User => Ok(()),
        },
        Action::ViewItem(item) | Action::DeleteItem(item) => {
            if ItemScope::for_actor(actor).admits(item) {
                Ok(())
            } else {
                Err(Denial::ItemHidden)
            }
        }
        Action::UpdateItem => match actor.role {
            Role::User => Err(Denial::UserCannotUpdateItems),
            Role::Superadmin | Role::Admin => Ok(()),
        },
        Action::ViewLogs => match actor.role {
            Role::User => Err(Denial::UserCannotViewLogs),
            Role::Superadmin | Role::Admin => Ok(()),
        },
        Action::ManageOrganization => {
            require_superadmin(actor, Denial::OnlySuperadminManagesOrganization)
        }
    }
}

/// Availability gate: an inactive organization locks out everyone but the
/// superadmin. No organization row means the gate is open.
pub fn organization_gate(actor: &Member, organization: Option<&OrganizationModel>) -> Decision {
    match organization {
        Some(org) if !org.is_active && !actor.is_superadmin() => {
            Err(Denial::OrganizationInactive)
        }
        _ => Ok(()),
    }
}

/// Suspended members keep their session but may not act.
pub fn suspension_gate(actor: &Member) -> Decision {
    if actor.active {
        Ok(())
    } else {
        Err(Denial::MemberSuspended)
    }
}

fn require_superadmin(actor: &Member, denial: Denial) -> Decision {
    if actor.is_superadmin() {
        Ok(())
    } else {
        Err(denial)
    }
}

fn can_update_member(actor: &Member, target: &Member) -> Decision {
    if actor.id == target.id {
        return Ok(());
    }
    match actor.role {
        Role::Superadmin => Ok(()),
        Role::Admin if target.role == Role::User => Ok(()),
        Role::Admin => Err(Denial::AdminUpdatesUsersOnly),
        Role::User => Err(Denial::UserUpdatesSelfOnly),
    }
}

fn can_set_active(actor: &Member, target: &Member, active: bool) -> Decision {
    if actor.role == Role::User {
        return Err(Denial::UserCannotToggleActive);
    }
    if !active {
        if actor.id == target.id {
            return Err(Denial::SelfSuspension);
        }
        return Ok(());
    }
    match target.suspended_by {
        Some(suspender) if suspender != actor.id && !actor.is_superadmin() => {
            Err(Denial::NotSuspender)
        }
        _ => Ok(()),
    }
}
