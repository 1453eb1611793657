//! Authentication: password hashing, access/refresh tokens, and the
//! request extractor that resolves the calling user.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::validation::{validate_email, validate_password_strength};
use crate::db::{LoginRequest, LoginResponse, RegisterRequest, User, UserResponse};
use crate::util::{now_rfc3339, rfc3339_after};
use crate::AppState;

pub const AUTH_HEADER: &str = "x-auth-token";

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// The authenticated caller, resolved from the access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random opaque token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Sign a short-lived access token for a user
pub fn sign_access_token(
    secret: &str,
    user_id: &str,
    role: &str,
    minutes: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (chrono::Utc::now() + chrono::Duration::minutes(minutes)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Decode and validate an access token. Returns None on any failure,
/// including expiry.
pub fn decode_access_token(secret: &str, token: &str) -> Option<Claims> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTH_HEADER).and_then(|h| h.to_str().ok())
}

/// Pick the role a new account gets. Self-assignment of the admin role
/// requires an already-valid admin token; everyone else gets what they
/// asked for, or "user".
pub(crate) fn resolve_role(requested: Option<&str>, caller: Option<&Claims>) -> String {
    match requested {
        Some("admin") => {
            if caller.map(|c| c.role == "admin").unwrap_or(false) {
                "admin".to_string()
            } else {
                "user".to_string()
            }
        }
        Some(other) if !other.is_empty() => other.to_string(),
        _ => "user".to_string(),
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("No token, authorization denied"))?;

        let claims = decode_access_token(&state.config.auth.jwt_secret, token)
            .ok_or_else(|| ApiError::unauthorized("Token is not valid"))?;

        Ok(AuthUser {
            id: claims.sub,
            role: claims.role,
        })
    }
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Register a new account.
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if !validate_email(&request.email) {
        return Err(ApiError::validation("Invalid email address"));
    }
    if let Some(error) = validate_password_strength(&request.password) {
        return Err(ApiError::validation(error));
    }

    let caller = token_from_headers(&headers)
        .and_then(|t| decode_access_token(&state.config.auth.jwt_secret, t));
    let role = resolve_role(request.role.as_deref(), caller.as_ref());

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Registration failed")
    })?;
    let now = now_rfc3339();

    let result = sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&request.username)
    .bind(&request.email)
    .bind(&password_hash)
    .bind(&role)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &result {
        if db_err.message().contains("UNIQUE constraint failed") {
            return Err(ApiError::conflict("Username or email already in use"));
        }
    }
    result?;

    tracing::info!(username = %request.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registered".to_string(),
            user: UserResponse {
                id,
                username: request.username,
                email: request.email,
                role,
            },
        }),
    ))
}

/// Log in with email and password.
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = sign_access_token(
        &state.config.auth.jwt_secret,
        &user.id,
        &user.role,
        state.config.auth.access_token_minutes,
    )
    .map_err(|e| {
        tracing::error!("Failed to sign access token: {}", e);
        ApiError::internal("Login failed")
    })?;

    // Opaque refresh token, stored hashed
    let refresh_token = generate_token();
    let token_hash = hash_token(&refresh_token);
    let expires_at = rfc3339_after(chrono::Duration::days(state.config.auth.refresh_token_days));

    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(&token_hash)
    .bind(&expires_at)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(Json(LoginResponse {
        token,
        refresh_token,
        user: UserResponse::from(user),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub token: String,
}

/// Exchange a refresh token for a new access token.
///
/// POST /api/auth/refresh-token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let token_hash = hash_token(&request.refresh_token);

    let row: Option<(String,)> = sqlx::query_as(
        "SELECT user_id FROM refresh_tokens WHERE token_hash = ? AND expires_at > ?",
    )
    .bind(&token_hash)
    .bind(now_rfc3339())
    .fetch_optional(&state.db)
    .await?;

    let (user_id,) = row.ok_or_else(|| ApiError::unauthorized("Refresh token expired"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let token = sign_access_token(
        &state.config.auth.jwt_secret,
        &user.id,
        &user.role,
        state.config.auth.access_token_minutes,
    )
    .map_err(|e| {
        tracing::error!("Failed to sign access token: {}", e);
        ApiError::internal("Token refresh failed")
    })?;

    Ok(Json(RefreshResponse { token }))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Log out: invalidate the presented refresh token.
///
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(token) = request.refresh_token {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ? AND user_id = ?")
            .bind(hash_token(&token))
            .bind(&user.id)
            .execute(&state.db)
            .await?;
    }
    Ok(Json(MessageResponse::new("Logged out")))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request a password reset token by email.
///
/// Always answers 200 to avoid account enumeration.
///
/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;

    if let Some((user_id,)) = row {
        let token = generate_token();
        let expires =
            rfc3339_after(chrono::Duration::hours(state.config.auth.reset_token_hours));

        sqlx::query("UPDATE users SET reset_token = ?, reset_token_expires = ? WHERE id = ?")
            .bind(hash_token(&token))
            .bind(&expires)
            .bind(&user_id)
            .execute(&state.db)
            .await?;

        // Fire-and-forget; a send failure must not leak into the response
        let mailer = state.mailer.clone();
        let email = request.email.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_password_reset(&email, &token).await {
                tracing::error!(email = %email, "Failed to send password reset email: {}", e);
            }
        });
    }

    Ok(Json(MessageResponse::new("Sent")))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Complete a password reset with a previously issued token.
///
/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(error) = validate_password_strength(&request.password) {
        return Err(ApiError::validation(error));
    }

    let row: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM users WHERE reset_token = ? AND reset_token_expires > ?",
    )
    .bind(hash_token(&request.token))
    .bind(now_rfc3339())
    .fetch_optional(&state.db)
    .await?;

    let (user_id,) = row.ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Password reset failed")
    })?;

    sqlx::query(
        "UPDATE users SET password_hash = ?, reset_token = NULL, reset_token_expires = NULL,
         updated_at = ? WHERE id = ?",
    )
    .bind(&password_hash)
    .bind(now_rfc3339())
    .bind(&user_id)
    .execute(&state.db)
    .await?;

    Ok(Json(MessageResponse::new("Password reset")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("Sup3rSecret!").unwrap();
        assert!(verify_password("Sup3rSecret!", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("Sup3rSecret!", "not-a-hash"));
    }

    #[test]
    fn test_access_token_round_trip() {
        let token = sign_access_token("secret", "user-1", "user", 60).unwrap();
        let claims = decode_access_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn test_access_token_rejects_wrong_secret() {
        let token = sign_access_token("secret", "user-1", "user", 60).unwrap();
        assert!(decode_access_token("other", &token).is_none());
    }

    #[test]
    fn test_access_token_rejects_expired() {
        let token = sign_access_token("secret", "user-1", "user", -5).unwrap();
        assert!(decode_access_token("secret", &token).is_none());
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
        assert_eq!(generate_token().len(), 64);
    }

    fn claims_with_role(role: &str) -> Claims {
        Claims {
            sub: "caller-1".to_string(),
            role: role.to_string(),
            exp: 0,
        }
    }

    #[test]
    fn test_resolve_role_downgrades_admin_without_admin_caller() {
        assert_eq!(resolve_role(Some("admin"), None), "user");
        let caller = claims_with_role("user");
        assert_eq!(resolve_role(Some("admin"), Some(&caller)), "user");
    }

    #[test]
    fn test_resolve_role_grants_admin_to_admin_caller() {
        let caller = claims_with_role("admin");
        assert_eq!(resolve_role(Some("admin"), Some(&caller)), "admin");
    }

    #[test]
    fn test_resolve_role_passes_other_roles_through() {
        assert_eq!(resolve_role(Some("moderator"), None), "moderator");
    }

    #[test]
    fn test_resolve_role_defaults_to_user() {
        assert_eq!(resolve_role(None, None), "user");
        assert_eq!(resolve_role(Some(""), None), "user");
    }
}
