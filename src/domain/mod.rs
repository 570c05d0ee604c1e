//! Membership core: identity, member and item lifecycles, the organization
//! singleton and the audit log. Transport-agnostic; every operation takes
//! typed arguments and returns `AppResult`.

pub mod audit;
pub mod identity;
pub mod items;
pub mod members;
pub mod organization;

use std::sync::{Arc, LazyLock};

use regex::Regex;

pub use audit::AuditLog;
pub use identity::{Identity, IssuedToken};
pub use items::{ItemChanges, ItemDraft, Items};
pub use members::{MemberChanges, MemberDraft, Members};
pub use organization::{OrganizationChanges, Organizations};

use crate::credential::CredentialHasher;
use crate::error::{AppError, AppResult};
use crate::store::Store;
use crate::token::TokenCodec;

pub const MIN_PASSWORD_LEN: usize = 8;

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// All core operations wired to one set of collaborators.
#[derive(Clone)]
pub struct Backend {
    pub identity: Identity,
    pub members: Members,
    pub items: Items,
    pub organization: Organizations,
    pub audit: AuditLog,
}

impl Backend {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenCodec>,
        token_ttl: Option<chrono::Duration>,
    ) -> Self {
        Self {
            identity: Identity::new(store.clone(), hasher.clone(), tokens, token_ttl),
            members: Members::new(store.clone(), hasher),
            items: Items::new(store.clone()),
            organization: Organizations::new(store.clone()),
            audit: AuditLog::new(store),
        }
    }
}

pub(crate) fn validate_email(email: &str) -> AppResult<()> {
    if RE_EMAIL.is_match(email) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!("invalid email '{}'", email)))
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::models::{Member, Role};
    use crate::store::MemoryStore;
    use crate::token::JwtCodec;

    /// Reversible stand-in for Argon2 so tests stay fast.
    pub struct PlainHasher;

    impl CredentialHasher for PlainHasher {
        fn hash(&self, raw: &str) -> AppResult<String> {
            Ok(format!("plain${}", raw))
        }

        fn verify(&self, raw: &str, hash: &str) -> bool {
            hash.strip_prefix("plain$") == Some(raw)
        }
    }

    pub const PASSWORD: &str = "password123";

    pub fn backend() -> (Backend, MemoryStore) {
        let store = MemoryStore::new();
        let backend = Backend::new(
            Arc::new(store.clone()),
            Arc::new(PlainHasher),
            Arc::new(JwtCodec::new("test-secret")),
            Some(chrono::Duration::hours(1)),
        );
        (backend, store)
    }

    pub fn draft(email: &str, role: Role) -> MemberDraft {
        MemberDraft {
            email: email.to_string(),
            name: "Test".to_string(),
            surname: "Member".to_string(),
            role,
            password: PASSWORD.to_string(),
        }
    }

    /// Registers the superadmin and returns it.
    pub async fn root(backend: &Backend) -> Member {
        backend
            .identity
            .register(draft("root@x.com", Role::Superadmin))
            .await
            .unwrap()
    }

    /// Creates a member through the superadmin.
    pub async fn member(backend: &Backend, root: &Member, email: &str, role: Role) -> Member {
        backend.members.create(root, draft(email, role)).await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("first.last@sub.example.org").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@x.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345678").is_ok());
        assert!(matches!(validate_password("short"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("name", "Ada").is_ok());
        assert!(require_non_empty("name", "   ").is_err());
    }
}
