use std::collections::HashMap;

use actix_web::HttpRequest;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::UserConfig;
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "session_token";

/// Hashes a password with the given salt; stored form is `salt:sha256hex`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let digest = Sha256::digest(format!("{password}{salt}").as_bytes());
    format!("{salt}:{}", hex::encode(digest))
}

/// Verifies against `salt:sha256hex`, falling back to a plain-text compare
/// for development configs.
fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once(':') {
        Some((salt, _)) => hash_password(password, salt) == stored,
        None => password == stored,
    }
}

struct TokenEntry {
    username: String,
    expires_at: DateTime<Utc>,
}

/// In-memory session token registry. Tokens are random UUIDs handed out on
/// login and dropped on logout or expiry.
pub struct AuthTokens {
    users: Vec<UserConfig>,
    ttl: Duration,
    tokens: RwLock<HashMap<String, TokenEntry>>,
}

impl AuthTokens {
    pub fn new(users: Vec<UserConfig>, ttl_minutes: i64) -> Self {
        Self {
            users,
            ttl: Duration::minutes(ttl_minutes),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Checks credentials and mints a session token on success.
    pub fn login(&self, username: &str, password: &str) -> Option<String> {
        let user = self.users.iter().find(|u| u.username == username)?;
        if !verify_password(password, &user.password) {
            log::warn!("Failed login attempt for user {username}");
            return None;
        }

        let token = Uuid::new_v4().to_string();
        self.tokens.write().insert(
            token.clone(),
            TokenEntry {
                username: username.to_string(),
                expires_at: Utc::now() + self.ttl,
            },
        );
        log::info!("Created auth session for user {username}");
        Some(token)
    }

    /// Resolves a token to its username; expired tokens are purged on sight.
    pub fn resolve(&self, token: &str) -> Option<String> {
        let expired = {
            let tokens = self.tokens.read();
            let entry = tokens.get(token)?;
            if entry.expires_at > Utc::now() {
                return Some(entry.username.clone());
            }
            true
        };
        if expired {
            self.tokens.write().remove(token);
        }
        None
    }

    pub fn invalidate(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }

    /// Current user from the session cookie or a Bearer header.
    pub fn current_user(&self, req: &HttpRequest) -> Option<String> {
        if let Some(cookie) = req.cookie(SESSION_COOKIE)
            && let Some(username) = self.resolve(cookie.value())
        {
            return Some(username);
        }

        let header = req.headers().get("Authorization")?.to_str().ok()?;
        let token = header.strip_prefix("Bearer ")?;
        self.resolve(token)
    }

    /// Auth guard used by every protected handler.
    pub fn require(&self, req: &HttpRequest) -> Result<String, ApiError> {
        self.current_user(req).ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AuthTokens {
        AuthTokens::new(
            vec![
                UserConfig {
                    username: "admin".to_string(),
                    password: hash_password("s3cret", "abcd1234"),
                },
                UserConfig {
                    username: "demo".to_string(),
                    password: "plain-dev".to_string(),
                },
            ],
            15,
        )
    }

    #[test]
    fn test_login_with_hashed_password() {
        let auth = registry();
        let token = auth.login("admin", "s3cret").unwrap();
        assert_eq!(auth.resolve(&token), Some("admin".to_string()));
    }

    #[test]
    fn test_login_with_plain_dev_password() {
        let auth = registry();
        assert!(auth.login("demo", "plain-dev").is_some());
    }

    #[test]
    fn test_login_rejects_bad_credentials() {
        let auth = registry();
        assert!(auth.login("admin", "wrong").is_none());
        assert!(auth.login("ghost", "s3cret").is_none());
    }

    #[test]
    fn test_invalidate_drops_token() {
        let auth = registry();
        let token = auth.login("admin", "s3cret").unwrap();
        assert!(auth.invalidate(&token));
        assert_eq!(auth.resolve(&token), None);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = AuthTokens::new(
            vec![UserConfig {
                username: "admin".to_string(),
                password: "pw".to_string(),
            }],
            // Already expired relative to now
            -1,
        );
        let token = auth.login("admin", "pw").unwrap();
        assert_eq!(auth.resolve(&token), None);
    }
}
