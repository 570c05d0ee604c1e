use std::env;

/// Upper bound for `TOKEN_TTL_HOURS`, about a century.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 100;

#[derive(Clone, Debug)]
pub struct Config {
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    /// Zero disables token expiry. Capped at `MAX_TOKEN_TTL_HOURS`.
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "50051".to_string())
                .parse()
                .unwrap_or(50051),
            jwt_secret: env::var("JWT_SECRET")?,
            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        if self.token_ttl_hours > 0 {
            Some(chrono::Duration::hours(
                self.token_ttl_hours.min(MAX_TOKEN_TTL_HOURS),
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token_ttl_hours: i64) -> Config {
        Config {
            database_url: None,
            server_host: "127.0.0.1".to_string(),
            server_port: 50051,
            jwt_secret: "secret".to_string(),
            token_ttl_hours,
        }
    }

    #[test]
    fn test_server_addr() {
        assert_eq!(config(24).server_addr(), "127.0.0.1:50051");
    }

    #[test]
    fn test_token_ttl() {
        assert_eq!(config(24).token_ttl(), Some(chrono::Duration::hours(24)));
        assert_eq!(config(0).token_ttl(), None);
        assert_eq!(config(-5).token_ttl(), None);
    }

    #[test]
    fn test_token_ttl_is_capped() {
        let cap = Some(chrono::Duration::hours(MAX_TOKEN_TTL_HOURS));
        assert_eq!(config(3_000_000_000).token_ttl(), cap);
        assert_eq!(config(i64::MAX).token_ttl(), cap);
    }
}
