use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

use crate::error::{AppError, AppResult};

/// One-way password hashing primitive.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, raw: &str) -> AppResult<String>;

    /// False for a wrong password and for a stored hash that cannot be parsed.
    fn verify(&self, raw: &str, hash: &str) -> bool;
}

#[derive(Debug, Default, Clone)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, raw: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(raw.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))
    }

    fn verify(&self, raw: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("Invalid password hash in store");
                return false;
            }
        };
        Argon2::default()
            .verify_password(raw.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify() {
        let hasher = Argon2Hasher;
        let hash = hasher.hash("correct horse").unwrap();

        assert_ne!(hash, "correct horse");
        assert!(hash.starts_with("$argon2"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("wrong horse", &hash));
    }

    #[test]
    fn test_garbage_hash_does_not_verify() {
        assert!(!Argon2Hasher.verify("anything", "not-a-phc-string"));
    }
}
