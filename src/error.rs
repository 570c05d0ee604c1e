use thiserror::Error;
use tonic::Status;

use crate::policy::Denial;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate email, second superadmin or second organization.
    #[error("Conflict: {0}")]
    ValidationConflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(Denial),

    /// Bad login, bad or expired token, or a token whose member is gone.
    #[error("Invalid credentials")]
    InvalidCredential,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::MemberHidden => AppError::NotFound("Member not found".to_string()),
            Denial::ItemHidden => AppError::NotFound("Item not found".to_string()),
            other => AppError::PermissionDenied(other),
        }
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                Status::internal("Database error")
            }
            AppError::NotFound(msg) => Status::not_found(msg),
            AppError::InvalidInput(msg) => Status::invalid_argument(msg),
            AppError::ValidationConflict(msg) => Status::already_exists(msg),
            AppError::PermissionDenied(denial) => Status::permission_denied(denial.reason()),
            AppError::InvalidCredential => Status::unauthenticated("Invalid credentials"),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                Status::internal(msg)
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_masked_denials_become_not_found() {
        assert!(matches!(AppError::from(Denial::MemberHidden), AppError::NotFound(_)));
        assert!(matches!(AppError::from(Denial::ItemHidden), AppError::NotFound(_)));
        assert!(matches!(
            AppError::from(Denial::NotSuspender),
            AppError::PermissionDenied(Denial::NotSuspender)
        ));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), Code::NotFound),
            (AppError::InvalidInput("x".into()), Code::InvalidArgument),
            (AppError::ValidationConflict("x".into()), Code::AlreadyExists),
            (AppError::PermissionDenied(Denial::UserCannotViewLogs), Code::PermissionDenied),
            (AppError::InvalidCredential, Code::Unauthenticated),
            (AppError::Internal("x".into()), Code::Internal),
        ];
        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn test_permission_denied_carries_reason() {
        let status = Status::from(AppError::PermissionDenied(Denial::SelfSuspension));
        assert_eq!(status.message(), Denial::SelfSuspension.reason());
    }
}
