use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::credential::CredentialHasher;
use crate::domain::{audit, members::MemberDraft};
use crate::error::{AppError, AppResult};
use crate::models::{Member, NewMember, Role};
use crate::store::Store;
use crate::token::{Claims, TokenCodec};

/// A freshly signed bearer credential.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Identity {
    store: Arc<dyn Store>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<dyn TokenCodec>,
    token_ttl: Option<chrono::Duration>,
}

impl Identity {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenCodec>,
        token_ttl: Option<chrono::Duration>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            token_ttl,
        }
    }

    /// Self-service registration with the requested role.
    pub async fn register(&self, draft: MemberDraft) -> AppResult<Member> {
        draft.validate()?;
        let password_hash = self.hasher.hash(&draft.password)?;

        let mut tx = self.store.begin().await?;
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

        let member = tx
            .insert_member(NewMember {
                email: draft.email,
                name: draft.name,
                surname: draft.surname,
                role: draft.role,
                password_hash,
            })
            .await?;
        audit::append(tx.as_mut(), &member, audit::CREATE_MEMBER, member.id).await?;
        tx.commit().await?;

        tracing::info!("Registered member {} as {}", member.id, member.role);
        Ok(member)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<Member> {
        let mut tx = self.store.begin().await?;
        let member = tx.member_by_email(email).await?;
        drop(tx);

        match member {
            Some(member) if self.hasher.verify(password, &member.password_hash) => Ok(member),
            _ => {
                tracing::debug!("Failed login for {}", email);
                Err(AppError::InvalidCredential)
            }
        }
    }

    pub fn issue_credential(&self, member: &Member) -> AppResult<IssuedToken> {
        let now = Utc::now();
        let expires_at = match self.token_ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or_else(|| {
                AppError::Internal("token lifetime out of range".to_string())
            })?),
            None => None,
        };
        let claims = Claims {
            email: member.email.clone(),
            role: member.role,
            name: member.name.clone(),
            surname: member.surname.clone(),
            iat: now.timestamp(),
            exp: expires_at.map(|exp| exp.timestamp()),
        };
        Ok(IssuedToken {
            access_token: self.tokens.sign(&claims)?,
            token_type: "bearer".to_string(),
            expires_at,
        })
    }

    /// Authenticates and signs in one step.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<IssuedToken> {
        let member = self.authenticate(email, password).await?;
        self.issue_credential(&member)
    }

    /// Maps a presented token back to the current member record.
    pub async fn resolve_credential(&self, token: &str) -> AppResult<Member> {
        let claims = self
            .tokens
            .verify(token)
            .ok_or(AppError::InvalidCredential)?;
        let mut tx = self.store.begin().await?;
        let member = tx.member_by_email(&claims.email).await?;
        member.ok_or(AppError::InvalidCredential)
    }
}
