/*!
 * # Authentication and Authorization Module
 *
 * JWT authentication with refresh token support, argon2 password hashing,
 * and a staff gate for the privileged admin endpoints.
 */

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::user::{self, Entity as UserEntity};

mod types;

pub use types::*;

const REFRESH_SCOPE: &str = "refresh";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Subject (user ID)
    pub name: Option<String>,  // User's name
    pub email: Option<String>, // User's email
    pub is_staff: bool,        // Staff flag
    pub jti: String,           // JWT ID (unique identifier for this token)
    pub iat: i64,              // Issued at time
    pub exp: i64,              // Expiration time
    pub nbf: i64,              // Not valid before time
    pub iss: String,           // Issuer
    pub aud: String,           // Audience
    pub scope: Option<String>, // "refresh" for refresh tokens
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_staff: bool,
    pub token_id: String,
}

/// Type alias used by the handlers
pub type AuthenticatedUser = AuthUser;

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
}

impl AuthConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: "printpro-api".to_string(),
            jwt_issuer: "printpro-auth".to_string(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration as u64),
            refresh_token_expiration: Duration::from_secs(cfg.refresh_token_expiration as u64),
        }
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("A user with this email already exists")]
    EmailInUse,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                msg.clone(),
            ),
            Self::UserNotFound => (
                StatusCode::NOT_FOUND,
                "AUTH_USER_NOT_FOUND",
                "User not found".to_string(),
            ),
            Self::EmailInUse => (
                StatusCode::BAD_REQUEST,
                "AUTH_EMAIL_IN_USE",
                "A user with this email already exists".to_string(),
            ),
            Self::PasswordMismatch => (
                StatusCode::BAD_REQUEST,
                "AUTH_PASSWORD_MISMATCH",
                "Passwords do not match".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_DATABASE_ERROR",
                "Database error".to_string(),
            ),
            Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Internal error".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

/// Authentication service that handles accounts and token issuance
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Register a new account and issue a token pair
    #[instrument(skip(self, request))]
    pub async fn register(&self, request: RegisterRequest) -> Result<(user::Model, TokenPair), AuthError> {
        if request.password != request.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }

        let existing = UserEntity::find()
            .filter(user::Column::Email.eq(request.email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(AuthError::EmailInUse);
        }

        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();

        let created = user::ActiveModel {
            email: Set(request.email),
            password_hash: Set(password_hash),
            first_name: Set(request.first_name),
            last_name: Set(request.last_name),
            is_staff: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!("Registered user {}", created.id);

        let tokens = self.generate_token(&created)?;
        Ok((created, tokens))
    }

    /// Verify credentials and issue a token pair
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(user::Model, TokenPair), AuthError> {
        let user = UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .filter(user::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.generate_token(&user)?;
        Ok((user, tokens))
    }

    /// Generate an access/refresh token pair for a user
    pub fn generate_token(&self, user: &user::Model) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let access_claims = Claims {
            sub: user.id.to_string(),
            name: Some(user.full_name()),
            email: Some(user.email.clone()),
            is_staff: user.is_staff,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            scope: None,
        };

        // Refresh token claims carry minimal data
        let refresh_claims = Claims {
            sub: user.id.to_string(),
            name: None,
            email: None,
            is_staff: false,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            scope: Some(REFRESH_SCOPE.to_string()),
        };

        let key = EncodingKey::from_secret(self.config.jwt_secret.as_bytes());
        let access_token = encode(&Header::new(Algorithm::HS256), &access_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;
        let refresh_token = encode(&Header::new(Algorithm::HS256), &refresh_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
        })
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.clone()]);
        validation.set_issuer(&[self.config.jwt_issuer.clone()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        Ok(claims)
    }

    /// Refresh an access token using a refresh token
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate_token(refresh_token)?;

        if claims.scope.as_deref() != Some(REFRESH_SCOPE) {
            return Err(AuthError::InvalidToken);
        }

        let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;
        let user = self.get_user(user_id).await?;

        self.generate_token(&user)
    }

    /// Load an active user by id
    pub async fn get_user(&self, user_id: i64) -> Result<user::Model, AuthError> {
        UserEntity::find_by_id(user_id)
            .filter(user::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Update the profile of an existing user
    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        user_id: i64,
        request: UpdateProfileRequest,
    ) -> Result<user::Model, AuthError> {
        let user = self.get_user(user_id).await?;

        if let Some(email) = &request.email {
            if *email != user.email {
                let taken = UserEntity::find()
                    .filter(user::Column::Email.eq(email.clone()))
                    .one(&*self.db)
                    .await?;
                if taken.is_some() {
                    return Err(AuthError::EmailInUse);
                }
            }
        }

        let mut active: user::ActiveModel = user.into();
        if let Some(email) = request.email {
            active.email = Set(email);
        }
        if let Some(first_name) = request.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = request.last_name {
            active.last_name = Set(last_name);
        }

        Ok(active.update(&*self.db).await?)
    }

    /// Change the password of an existing user
    #[instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        user_id: i64,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let user = self.get_user(user_id).await?;

        if !verify_password(&request.current_password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash_password(&request.new_password)?);
        active.update(&*self.db).await?;

        info!("Password changed for user {}", user_id);
        Ok(())
    }
}

/// Hash a password with argon2 and a random salt
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::InternalError(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored argon2 hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::InternalError(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Authentication middleware that extracts and validates auth tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers().clone();

    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(&headers, &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Like [`auth_middleware`] but lets unauthenticated requests pass through.
/// Guest carts rely on this: a valid token attaches the user, anything else
/// leaves the request anonymous.
pub async fn optional_auth_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers().clone();

    if let Some(auth_service) = request.extensions().get::<Arc<AuthService>>().cloned() {
        if let Ok(user) = extract_auth_from_headers(&headers, &auth_service) {
            request.extensions_mut().insert(user);
        }
    }

    next.run(request).await
}

/// Middleware gating staff-only endpoints
pub async fn staff_middleware(request: Request, next: Next) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return Err(AuthError::MissingAuth),
    };

    if !user.is_staff {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extract authentication info from request headers
fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_value) = auth_header.to_str() {
            if auth_value.starts_with("Bearer ") {
                let token = auth_value.trim_start_matches("Bearer ").trim();
                let claims = auth_service.validate_token(token)?;

                if claims.scope.as_deref() == Some(REFRESH_SCOPE) {
                    return Err(AuthError::InvalidToken);
                }

                let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;
                return Ok(AuthUser {
                    user_id,
                    name: claims.name,
                    email: claims.email,
                    is_staff: claims.is_staff,
                    token_id: claims.jti,
                });
            }
        }
    }

    Err(AuthError::MissingAuth)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_optional_auth(self) -> Self;
    fn with_staff(self) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_optional_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(optional_auth_middleware))
    }

    fn with_staff(self) -> Self {
        self.layer(axum::middleware::from_fn(staff_middleware))
            .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> user::Model {
        user::Model {
            id: 7,
            email: "customer@example.com".to_string(),
            password_hash: String::new(),
            first_name: "Aisha".to_string(),
            last_name: "Rahman".to_string(),
            is_staff: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_service() -> AuthService {
        let config = AuthConfig {
            jwt_secret: "unit-test-secret-which-is-long-enough-for-hs256-keys".to_string(),
            jwt_audience: "printpro-api".to_string(),
            jwt_issuer: "printpro-auth".to_string(),
            access_token_expiration: Duration::from_secs(3600),
            refresh_token_expiration: Duration::from_secs(86400),
        };
        // The DB handle is unused by the pure token paths under test
        AuthService::new(config, Arc::new(DatabaseConnection::Disconnected))
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("s3cret-password").unwrap();
        assert!(verify_password("s3cret-password", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn access_token_validates_and_carries_claims() {
        let service = test_service();
        let tokens = service.generate_token(&test_user()).unwrap();

        let claims = service.validate_token(&tokens.access_token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email.as_deref(), Some("customer@example.com"));
        assert!(!claims.is_staff);
        assert!(claims.scope.is_none());
    }

    #[test]
    fn refresh_token_is_marked_with_scope() {
        let service = test_service();
        let tokens = service.generate_token(&test_user()).unwrap();

        let claims = service.validate_token(&tokens.refresh_token).unwrap();
        assert_eq!(claims.scope.as_deref(), Some("refresh"));
        assert!(claims.email.is_none());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = test_service();
        let tokens = service.generate_token(&test_user()).unwrap();

        let mut tampered = tokens.access_token.clone();
        tampered.push('x');
        assert!(service.validate_token(&tampered).is_err());
    }
}
