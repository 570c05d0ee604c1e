use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::Role;

/// Identity claim carried by a bearer token. Never holds the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub role: Role,
    pub name: String,
    pub surname: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

pub trait TokenCodec: Send + Sync {
    fn sign(&self, claims: &Claims) -> AppResult<String>;

    /// `None` for any token that does not verify; callers must not learn why.
    fn verify(&self, token: &str) -> Option<Claims>;
}

/// HS256 JWT signed with the server secret.
pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is optional: checked when present, tolerated when absent
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenCodec for JwtCodec {
    fn sign(&self, claims: &Claims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("JWT error: {}", e)))
    }

    fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("Rejected token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use chrono::Utc;

    fn claims(exp: Option<i64>) -> Claims {
        Claims {
            email: "a@x.com".to_string(),
            role: Role::Admin,
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            iat: Utc::now().timestamp(),
            exp,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let codec = JwtCodec::new("secret");
        let original = claims(Some(Utc::now().timestamp() + 3600));
        let token = codec.sign(&original).unwrap();
        assert_eq!(codec.verify(&token), Some(original));
    }

    #[test]
    fn test_non_expiring_token_verifies() {
        let codec = JwtCodec::new("secret");
        let token = codec.sign(&claims(None)).unwrap();
        assert_eq!(codec.verify(&token).map(|c| c.exp), Some(None));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtCodec::new("secret").sign(&claims(None)).unwrap();
        assert!(JwtCodec::new("other").verify(&token).is_none());
        assert!(JwtCodec::new("secret").verify("garbage").is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = JwtCodec::new("secret");
        let token = codec
            .sign(&claims(Some(Utc::now().timestamp() - 3600)))
            .unwrap();
        assert!(codec.verify(&token).is_none());
    }

    #[test]
    fn test_payload_has_only_identity_claims() {
        let token = JwtCodec::new("secret").sign(&claims(None)).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["email", "iat", "name", "role", "surname"]);
        assert_eq!(json["role"], "admin");
    }
}
