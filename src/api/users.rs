//! Profile and admin user management endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::auth::{hash_password, AuthUser, MessageResponse};
use crate::api::error::ApiError;
use crate::api::validation::validate_password_strength;
use crate::db::{User, UserResponse};
use crate::util::now_rfc3339;
use crate::AppState;

/// Get the caller's profile.
///
/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_optional(&state.db)
        .await?;

    let row = row.ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(row)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
}

/// Update the caller's profile. An empty password means "unchanged".
///
/// PUT /api/auth/me
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    // Username/email collisions with other accounts
    let taken: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM users WHERE (username = ? OR email = ?) AND id != ?",
    )
    .bind(&request.username)
    .bind(&request.email)
    .bind(&user.id)
    .fetch_optional(&state.db)
    .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("Username or email already in use"));
    }

    let password_hash = match request.password.as_deref() {
        Some(p) if !p.trim().is_empty() => {
            if let Some(error) = validate_password_strength(p) {
                return Err(ApiError::validation(error));
            }
            Some(hash_password(p).map_err(|e| {
                tracing::error!("Failed to hash password: {}", e);
                ApiError::internal("Profile update failed")
            })?)
        }
        _ => None,
    };

    let updated: Option<User> = match password_hash {
        Some(hash) => {
            sqlx::query_as(
                "UPDATE users SET username = ?, email = ?, password_hash = ?, updated_at = ?
                 WHERE id = ? RETURNING *",
            )
            .bind(&request.username)
            .bind(&request.email)
            .bind(&hash)
            .bind(now_rfc3339())
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?
        }
        None => {
            sqlx::query_as(
                "UPDATE users SET username = ?, email = ?, updated_at = ?
                 WHERE id = ? RETURNING *",
            )
            .bind(&request.username)
            .bind(&request.email)
            .bind(now_rfc3339())
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?
        }
    };

    let updated = updated.ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(updated)))
}

// -------------------------------------------------------------------------
// Admin endpoints
// -------------------------------------------------------------------------

fn require_admin(user: &AuthUser) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin privileges required"))
    }
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

/// List users, optionally filtered by a username/email substring.
///
/// GET /api/auth/admin/users
pub async fn admin_list_users(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<Vec<AdminUserRow>>, ApiError> {
    require_admin(&user)?;

    let rows: Vec<AdminUserRow> = match query.search {
        Some(search) if !search.is_empty() => {
            let pattern = format!("%{}%", search);
            sqlx::query_as(
                "SELECT id, username, email, role, created_at FROM users
                 WHERE username LIKE ? OR email LIKE ? ORDER BY created_at DESC",
            )
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(&state.db)
            .await?
        }
        _ => {
            sqlx::query_as(
                "SELECT id, username, email, role, created_at FROM users
                 ORDER BY created_at DESC",
            )
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub username: String,
    pub email: String,
    pub role: String,
    pub password: Option<String>,
}

/// Update any user.
///
/// PUT /api/auth/admin/users/:id
pub async fn admin_update_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<AdminUpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin(&user)?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let password_hash = match request.password.as_deref() {
        Some(p) if !p.trim().is_empty() => Some(hash_password(p).map_err(|e| {
            tracing::error!("Failed to hash password: {}", e);
            ApiError::internal("User update failed")
        })?),
        _ => None,
    };

    let result: Result<Option<User>, sqlx::Error> = match password_hash {
        Some(hash) => {
            sqlx::query_as(
                "UPDATE users SET username = ?, email = ?, role = ?, password_hash = ?,
                 updated_at = ? WHERE id = ? RETURNING *",
            )
            .bind(&request.username)
            .bind(&request.email)
            .bind(&request.role)
            .bind(&hash)
            .bind(now_rfc3339())
            .bind(&id)
            .fetch_optional(&state.db)
            .await
        }
        None => {
            sqlx::query_as(
                "UPDATE users SET username = ?, email = ?, role = ?, updated_at = ?
                 WHERE id = ? RETURNING *",
            )
            .bind(&request.username)
            .bind(&request.email)
            .bind(&request.role)
            .bind(now_rfc3339())
            .bind(&id)
            .fetch_optional(&state.db)
            .await
        }
    };

    if let Err(sqlx::Error::Database(db_err)) = &result {
        if db_err.message().contains("UNIQUE constraint failed") {
            return Err(ApiError::conflict("Username or email already in use"));
        }
    }
    let updated = result?.ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse::from(updated)))
}

/// Delete a user. Owned events cascade away with them.
///
/// DELETE /api/auth/admin/users/:id
pub async fn admin_delete_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_admin(&user)?;

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(user_id = %id, "User deleted by admin");
    Ok(Json(MessageResponse::new("Deleted")))
}
