//! Direct (1:1) messaging with read tracking and a conversation list.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::db::{Conversation, DbPool, MessageWithSender};
use crate::util::now_rfc3339;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

pub(crate) async fn unread_total(db: &DbPool, user_id: &str) -> Result<i64, ApiError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0")
            .bind(user_id)
            .fetch_one(db)
            .await?;
    Ok(count)
}

/// Global unread count for the caller.
///
/// GET /api/messages/unread/count
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = unread_total(&state.db, &user.id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// Latest message per counterpart, regardless of direction. Conversations
/// are keyed by the unordered participant pair, so A→B and B→A collapse
/// into one entry.
pub(crate) async fn list_conversations(
    db: &DbPool,
    user_id: &str,
) -> Result<Vec<Conversation>, ApiError> {
    let rows: Vec<Conversation> = sqlx::query_as(
        "WITH ranked AS (
            SELECT m.id, m.content, m.created_at, m.event_id, e.title AS event_title,
                CASE WHEN m.sender_id = ? THEN m.receiver_id ELSE m.sender_id END AS other_user_id,
                u.username AS other_user_name,
                ROW_NUMBER() OVER (
                    PARTITION BY MIN(m.sender_id, m.receiver_id), MAX(m.sender_id, m.receiver_id)
                    ORDER BY m.created_at DESC
                ) AS rn
            FROM messages m
            JOIN events e ON m.event_id = e.id
            JOIN users u ON u.id = CASE WHEN m.sender_id = ? THEN m.receiver_id ELSE m.sender_id END
            WHERE m.sender_id = ? OR m.receiver_id = ?
        )
        SELECT r.id, r.content, r.created_at, r.event_id, r.event_title,
               r.other_user_id, r.other_user_name,
            (SELECT COUNT(*) FROM messages m2
             WHERE m2.sender_id = r.other_user_id AND m2.receiver_id = ? AND m2.is_read = 0
            ) AS unread_count
        FROM ranked r
        WHERE r.rn = 1
        ORDER BY r.created_at DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Conversation list for the caller.
///
/// GET /api/messages/conversations/me
pub async fn conversations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(list_conversations(&state.db, &user.id).await?))
}

/// Two-way thread, oldest first. Fetching the thread marks everything the
/// other party sent to the viewer as read.
pub(crate) async fn fetch_thread(
    db: &DbPool,
    viewer_id: &str,
    other_id: &str,
) -> Result<Vec<MessageWithSender>, ApiError> {
    sqlx::query("UPDATE messages SET is_read = 1 WHERE receiver_id = ? AND sender_id = ? AND is_read = 0")
        .bind(viewer_id)
        .bind(other_id)
        .execute(db)
        .await?;

    let rows: Vec<MessageWithSender> = sqlx::query_as(
        "SELECT m.*, u.username AS sender_name
         FROM messages m
         JOIN users u ON m.sender_id = u.id
         WHERE (m.sender_id = ? AND m.receiver_id = ?)
            OR (m.sender_id = ? AND m.receiver_id = ?)
         ORDER BY m.created_at ASC",
    )
    .bind(viewer_id)
    .bind(other_id)
    .bind(other_id)
    .bind(viewer_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Chat history with another user.
///
/// GET /api/messages/:otherUserId
pub async fn thread(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(other_user_id): Path<String>,
) -> Result<Json<Vec<MessageWithSender>>, ApiError> {
    Ok(Json(fetch_thread(&state.db, &user.id, &other_user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(alias = "receiver_id")]
    pub receiver_id: String,
    #[serde(alias = "event_id")]
    pub event_id: String,
    pub content: String,
}

pub(crate) async fn send_direct(
    db: &DbPool,
    sender_id: &str,
    receiver_id: &str,
    event_id: &str,
    content: &str,
) -> Result<MessageWithSender, ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::validation("Message content cannot be empty"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO messages (id, event_id, sender_id, receiver_id, content, is_read, created_at)
         VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(event_id)
    .bind(sender_id)
    .bind(receiver_id)
    .bind(content)
    .bind(now_rfc3339())
    .execute(db)
    .await?;

    let row: MessageWithSender = sqlx::query_as(
        "SELECT m.*, u.username AS sender_name
         FROM messages m JOIN users u ON m.sender_id = u.id
         WHERE m.id = ?",
    )
    .bind(&id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Send a direct message.
///
/// POST /api/messages
pub async fn send(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageWithSender>), ApiError> {
    let message = send_direct(
        &state.db,
        &user.id,
        &request.receiver_id,
        &request.event_id,
        &request.content,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
