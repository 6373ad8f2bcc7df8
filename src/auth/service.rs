//! Registration and login

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::{User, UserProfile, UserRepository};
use crate::error::{AppError, FieldError, Result};

use super::password::{hash_password, verify_password};
use super::token::TokenService;

pub const MIN_PASSWORD_LENGTH: usize = 6;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Registration request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Login request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

/// Account operations over the user table
pub struct AuthService<'a> {
    pool: &'a SqlitePool,
    tokens: &'a TokenService,
}

impl<'a> AuthService<'a> {
    pub fn new(pool: &'a SqlitePool, tokens: &'a TokenService) -> Self {
        Self { pool, tokens }
    }

    /// Create an account; the email must not be registered yet
    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let mut errors = Vec::new();
        if !is_valid_email(&request.email) {
            errors.push(FieldError::new("email", "Please enter a valid email"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                "password",
                format!("Password must be at least {} characters long", MIN_PASSWORD_LENGTH),
            ));
        }
        if request.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let users = UserRepository::new(self.pool);
        if users.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::BadRequest("User already exists".to_string()));
        }

        let password_hash = hash_password(&request.password)?;

        // A concurrent registration can still win the race to the unique index
        let user = match users.create(&request.email, &password_hash, &request.name).await {
            Err(AppError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
                return Err(AppError::BadRequest("User already exists".to_string()));
            }
            other => other?,
        };

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Check credentials and issue a session token
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let mut errors = Vec::new();
        if !is_valid_email(&request.email) {
            errors.push(FieldError::new("email", "Please enter a valid email"));
        }
        if request.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let user = UserRepository::new(self.pool)
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(&user.password_hash, &request.password)? {
            tracing::debug!(user_id = %user.id, "Login rejected");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let token = self.tokens.issue(&user.id, &user.email);
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginResponse {
            token,
            user: UserProfile::from(&user),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "secret1".to_string(),
            name: "Dana".to_string(),
        }
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("  first.last@example.org "));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_fields() {
        let pool = memory_pool().await;
        let tokens = TokenService::new("secret", 24);
        let auth = AuthService::new(&pool, &tokens);

        let request = RegisterRequest {
            email: "nope".into(),
            password: "12345".into(),
            name: "  ".into(),
        };
        match auth.register(&request).await {
            Err(AppError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert_eq!(fields, vec!["email", "password", "name"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_ignores_case() {
        let pool = memory_pool().await;
        let tokens = TokenService::new("secret", 24);
        let auth = AuthService::new(&pool, &tokens);

        auth.register(&register_request("dana@example.com")).await.unwrap();
        let err = auth
            .register(&register_request("DANA@Example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref msg) if msg == "User already exists"));
        assert_eq!(UserRepository::new(&pool).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let pool = memory_pool().await;
        let tokens = TokenService::new("secret", 24);
        let auth = AuthService::new(&pool, &tokens);

        let user = auth.register(&register_request("dana@example.com")).await.unwrap();
        let response = auth
            .login(&LoginRequest {
                email: "Dana@example.com".into(),
                password: "secret1".into(),
            })
            .await
            .unwrap();

        assert_eq!(response.user.id, user.id);
        let claims = tokens.verify(&response.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "dana@example.com");
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let pool = memory_pool().await;
        let tokens = TokenService::new("secret", 24);
        let auth = AuthService::new(&pool, &tokens);
        auth.register(&register_request("dana@example.com")).await.unwrap();

        let wrong_password = auth
            .login(&LoginRequest {
                email: "dana@example.com".into(),
                password: "wrong-password".into(),
            })
            .await
            .unwrap_err();
        let unknown_email = auth
            .login(&LoginRequest {
                email: "ghost@example.com".into(),
                password: "secret1".into(),
            })
            .await
            .unwrap_err();

        for err in [wrong_password, unknown_email] {
            assert!(matches!(err, AppError::Unauthorized(ref msg) if msg == INVALID_CREDENTIALS));
        }
    }
}
