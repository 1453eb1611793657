//! Group chat scoped to an (event, time slot) pair. Open to the event
//! creator and to non-rejected registrants of that slot; admins can
//! always look in.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::events::fetch_event;
use crate::db::{DbPool, GroupMember, GroupMessageWithSender};
use crate::util::now_rfc3339;
use crate::AppState;

pub(crate) async fn ensure_group_access(
    db: &DbPool,
    user: &AuthUser,
    event_id: &str,
    time_slot_id: &str,
) -> Result<(), ApiError> {
    let event = fetch_event(db, event_id).await?;
    if user.is_admin() || event.created_by == user.id {
        return Ok(());
    }

    let (registered,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM registrations
         WHERE user_id = ? AND event_id = ? AND time_slot_id = ? AND status != 'rejected'",
    )
    .bind(&user.id)
    .bind(event_id)
    .bind(time_slot_id)
    .fetch_one(db)
    .await?;

    if registered > 0 {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Must be registered for this time slot to access its chat",
        ))
    }
}

pub(crate) async fn fetch_group_history(
    db: &DbPool,
    event_id: &str,
    time_slot_id: &str,
) -> Result<Vec<GroupMessageWithSender>, ApiError> {
    let rows: Vec<GroupMessageWithSender> = sqlx::query_as(
        "SELECT g.*, u.username AS sender_name
         FROM group_messages g
         JOIN users u ON g.sender_id = u.id
         WHERE g.event_id = ? AND g.time_slot_id = ?
         ORDER BY g.created_at ASC",
    )
    .bind(event_id)
    .bind(time_slot_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Chat history for a slot, oldest first.
///
/// GET /api/messages/group/:eventId/:timeSlotId
pub async fn history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((event_id, time_slot_id)): Path<(String, String)>,
) -> Result<Json<Vec<GroupMessageWithSender>>, ApiError> {
    ensure_group_access(&state.db, &user, &event_id, &time_slot_id).await?;
    Ok(Json(
        fetch_group_history(&state.db, &event_id, &time_slot_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct GroupMessageRequest {
    pub content: String,
}

pub(crate) async fn send_group(
    db: &DbPool,
    sender_id: &str,
    event_id: &str,
    time_slot_id: &str,
    content: &str,
) -> Result<GroupMessageWithSender, ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::validation("Message content cannot be empty"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO group_messages (id, event_id, time_slot_id, sender_id, content, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(event_id)
    .bind(time_slot_id)
    .bind(sender_id)
    .bind(content)
    .bind(now_rfc3339())
    .execute(db)
    .await?;

    let row: GroupMessageWithSender = sqlx::query_as(
        "SELECT g.*, u.username AS sender_name
         FROM group_messages g JOIN users u ON g.sender_id = u.id
         WHERE g.id = ?",
    )
    .bind(&id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Post to a slot's chat.
///
/// POST /api/messages/group/:eventId/:timeSlotId
pub async fn send(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((event_id, time_slot_id)): Path<(String, String)>,
    Json(request): Json<GroupMessageRequest>,
) -> Result<(StatusCode, Json<GroupMessageWithSender>), ApiError> {
    ensure_group_access(&state.db, &user, &event_id, &time_slot_id).await?;
    let message = send_group(
        &state.db,
        &user.id,
        &event_id,
        &time_slot_id,
        &request.content,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// The creator appears as Organizer; non-rejected slot registrants as
/// Attendee. A creator who also registered shows up once, as Organizer.
pub(crate) async fn list_group_members(
    db: &DbPool,
    event_id: &str,
    time_slot_id: &str,
) -> Result<Vec<GroupMember>, ApiError> {
    let rows: Vec<GroupMember> = sqlx::query_as(
        "SELECT DISTINCT u.id, u.username,
            CASE WHEN u.id = e.created_by THEN 'Organizer' ELSE 'Attendee' END AS group_role
         FROM users u
         JOIN events e ON e.id = ?
         LEFT JOIN registrations r
            ON r.user_id = u.id AND r.event_id = e.id AND r.time_slot_id = ?
            AND r.status != 'rejected'
         WHERE u.id = e.created_by OR r.user_id IS NOT NULL
         ORDER BY group_role DESC, u.username ASC",
    )
    .bind(event_id)
    .bind(time_slot_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Who is in the chat.
///
/// GET /api/messages/group/:eventId/:timeSlotId/members
pub async fn members(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((event_id, time_slot_id)): Path<(String, String)>,
) -> Result<Json<Vec<GroupMember>>, ApiError> {
    ensure_group_access(&state.db, &user, &event_id, &time_slot_id).await?;
    Ok(Json(
        list_group_members(&state.db, &event_id, &time_slot_id).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::api::events::{create_event_record, EventForm};
    use crate::api::registrations::{register_for_slot, set_attendee_status};
    use crate::db;
    use crate::db::RegistrationStatus;

    async fn seed_user(pool: &DbPool, name: &str, role: &str) -> AuthUser {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
             VALUES (?, ?, ?, 'x', ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(format!("{}@example.com", name))
        .bind(role)
        .bind(now_rfc3339())
        .bind(now_rfc3339())
        .execute(pool)
        .await
        .unwrap();
        AuthUser {
            id,
            role: role.to_string(),
        }
    }

    async fn seed_event_with_slot(pool: &DbPool, creator: &str) -> (String, String) {
        let form = EventForm {
            title: Some("Workshop".to_string()),
            time_slots: Some(
                r#"[{"startTime":"2026-10-01T10:00:00+00:00","durationMinutes":90,"maxAttendees":10}]"#
                    .to_string(),
            ),
            ..Default::default()
        };
        let event = create_event_record(pool, creator, &form).await.unwrap();
        let (slot_id,): (String,) =
            sqlx::query_as("SELECT id FROM time_slots WHERE event_id = ?")
                .bind(&event.id)
                .fetch_one(pool)
                .await
                .unwrap();
        (event.id, slot_id)
    }

    #[tokio::test]
    async fn test_access_requires_registration_or_ownership() {
        let pool = db::init_in_memory().await.unwrap();
        let host = seed_user(&pool, "host", "user").await;
        let guest = seed_user(&pool, "guest", "user").await;
        let outsider = seed_user(&pool, "outsider", "user").await;
        let admin = seed_user(&pool, "root", "admin").await;
        let (event_id, slot_id) = seed_event_with_slot(&pool, &host.id).await;

        register_for_slot(&pool, &guest.id, &event_id, Some(&slot_id))
            .await
            .unwrap();

        assert!(ensure_group_access(&pool, &host, &event_id, &slot_id).await.is_ok());
        assert!(ensure_group_access(&pool, &guest, &event_id, &slot_id).await.is_ok());
        assert!(ensure_group_access(&pool, &admin, &event_id, &slot_id).await.is_ok());

        let err = ensure_group_access(&pool, &outsider, &event_id, &slot_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        // Missing event reads as 404, not 403
        let err = ensure_group_access(&pool, &outsider, "no-such-event", &slot_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_rejected_registrant_loses_access() {
        let pool = db::init_in_memory().await.unwrap();
        let host = seed_user(&pool, "host", "user").await;
        let guest = seed_user(&pool, "guest", "user").await;
        let (event_id, slot_id) = seed_event_with_slot(&pool, &host.id).await;

        register_for_slot(&pool, &guest.id, &event_id, Some(&slot_id))
            .await
            .unwrap();
        assert!(ensure_group_access(&pool, &guest, &event_id, &slot_id).await.is_ok());

        set_attendee_status(&pool, &event_id, &guest.id, RegistrationStatus::Rejected)
            .await
            .unwrap();
        let err = ensure_group_access(&pool, &guest, &event_id, &slot_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_history_is_scoped_to_the_slot() {
        let pool = db::init_in_memory().await.unwrap();
        let host = seed_user(&pool, "host", "user").await;
        let form = EventForm {
            title: Some("Two slots".to_string()),
            time_slots: Some(
                r#"[{"startTime":"2026-10-01T10:00:00+00:00"},
                    {"startTime":"2026-10-02T10:00:00+00:00"}]"#
                    .to_string(),
            ),
            ..Default::default()
        };
        let event = create_event_record(&pool, &host.id, &form).await.unwrap();
        let slots: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM time_slots WHERE event_id = ? ORDER BY start_time")
                .bind(&event.id)
                .fetch_all(&pool)
                .await
                .unwrap();

        send_group(&pool, &host.id, &event.id, &slots[0].0, "morning crew").await.unwrap();
        send_group(&pool, &host.id, &event.id, &slots[1].0, "day two").await.unwrap();
        send_group(&pool, &host.id, &event.id, &slots[0].0, "see you soon").await.unwrap();

        let first = fetch_group_history(&pool, &event.id, &slots[0].0).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].content, "morning crew");
        assert_eq!(first[1].content, "see you soon");

        let second = fetch_group_history(&pool, &event.id, &slots[1].0).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_members_lists_creator_once_as_organizer() {
        let pool = db::init_in_memory().await.unwrap();
        let host = seed_user(&pool, "host", "user").await;
        let guest = seed_user(&pool, "guest", "user").await;
        let (event_id, slot_id) = seed_event_with_slot(&pool, &host.id).await;

        // Creator registers for their own slot too
        register_for_slot(&pool, &host.id, &event_id, Some(&slot_id))
            .await
            .unwrap();
        register_for_slot(&pool, &guest.id, &event_id, Some(&slot_id))
            .await
            .unwrap();

        let members = list_group_members(&pool, &event_id, &slot_id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].username, "host");
        assert_eq!(members[0].group_role, "Organizer");
        assert_eq!(members[1].username, "guest");
        assert_eq!(members[1].group_role, "Attendee");
    }

    #[tokio::test]
    async fn test_empty_group_message_is_rejected() {
        let pool = db::init_in_memory().await.unwrap();
        let host = seed_user(&pool, "host", "user").await;
        let (event_id, slot_id) = seed_event_with_slot(&pool, &host.id).await;

        let err = send_group(&pool, &host.id, &event_id, &slot_id, "")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
