//! Registration workflow: sign up for a time slot, drop out, and the
//! creator-side attendee management.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::{AuthUser, MessageResponse};
use crate::api::error::ApiError;
use crate::api::events::{ensure_creator, fetch_event};
use crate::db::{Attendee, DbPool, Event, RegistrationStatus, TimeSlot};
use crate::util::now_rfc3339;
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SlotSelector {
    #[serde(alias = "time_slot_id")]
    pub time_slot_id: Option<String>,
}

/// Insert a registration for `user_id` on the given slot (or the event's
/// earliest slot when none was named). Returns the event and slot for the
/// confirmation email.
pub(crate) async fn register_for_slot(
    db: &DbPool,
    user_id: &str,
    event_id: &str,
    slot_id: Option<&str>,
) -> Result<(Event, TimeSlot), ApiError> {
    let event = fetch_event(db, event_id).await?;

    let slot: Option<TimeSlot> = match slot_id {
        Some(id) => {
            sqlx::query_as("SELECT * FROM time_slots WHERE id = ? AND event_id = ?")
                .bind(id)
                .bind(&event.id)
                .fetch_optional(db)
                .await?
        }
        None => {
            sqlx::query_as(
                "SELECT * FROM time_slots WHERE event_id = ? ORDER BY start_time ASC LIMIT 1",
            )
            .bind(&event.id)
            .fetch_optional(db)
            .await?
        }
    };
    let slot = match (slot, slot_id) {
        (Some(slot), _) => slot,
        (None, Some(_)) => return Err(ApiError::not_found("Time slot not found")),
        (None, None) => return Err(ApiError::bad_request("Event has no time slots")),
    };

    // Capacity: rejected registrations don't hold a seat
    let (taken,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM registrations WHERE time_slot_id = ? AND status != 'rejected'",
    )
    .bind(&slot.id)
    .fetch_one(db)
    .await?;
    if taken >= slot.max_attendees {
        return Err(ApiError::conflict("Time slot is full"));
    }

    let status = if event.requires_approval {
        RegistrationStatus::Pending
    } else {
        RegistrationStatus::Approved
    };

    // The (user_id, time_slot_id) primary key turns a duplicate attempt
    // into a constraint error here, even under concurrency
    let result = sqlx::query(
        "INSERT INTO registrations (user_id, event_id, time_slot_id, status, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&event.id)
    .bind(&slot.id)
    .bind(status.as_str())
    .bind(now_rfc3339())
    .execute(db)
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &result {
        if db_err.message().contains("UNIQUE constraint failed") {
            return Err(ApiError::conflict("Already registered for this time slot"));
        }
    }
    result?;

    Ok((event, slot))
}

/// Register the caller for a time slot of the event.
///
/// POST /api/events/:id/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<String>,
    body: Option<Json<SlotSelector>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let slot_id = body.and_then(|Json(b)| b.time_slot_id);
    let (event, slot) =
        register_for_slot(&state.db, &user.id, &event_id, slot_id.as_deref()).await?;

    tracing::info!(event_id = %event.id, slot_id = %slot.id, user_id = %user.id, "Registered");

    // Confirmation email must never block or fail the response
    let email: Option<(String,)> = sqlx::query_as("SELECT email FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_optional(&state.db)
        .await?;
    if let Some((email,)) = email {
        let mailer = state.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer
                .send_registration_confirmation(&email, &event, &slot.start_time)
                .await
            {
                tracing::error!(email = %email, "Failed to send confirmation email: {}", e);
            }
        });
    }

    Ok(Json(MessageResponse::new("Registered")))
}

/// Remove the caller's registrations. With a slot id, just that one; with
/// none, every registration the caller holds for the event.
pub(crate) async fn remove_registrations(
    db: &DbPool,
    user_id: &str,
    event_id: &str,
    slot_id: Option<&str>,
) -> Result<(), ApiError> {
    let result = match slot_id {
        Some(slot_id) => {
            sqlx::query(
                "DELETE FROM registrations WHERE user_id = ? AND event_id = ? AND time_slot_id = ?",
            )
            .bind(user_id)
            .bind(event_id)
            .bind(slot_id)
            .execute(db)
            .await?
        }
        None => {
            sqlx::query("DELETE FROM registrations WHERE user_id = ? AND event_id = ?")
                .bind(user_id)
                .bind(event_id)
                .execute(db)
                .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Registration not found"));
    }
    Ok(())
}

/// Deregister the caller.
///
/// DELETE /api/events/:id/register
pub async fn deregister(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<String>,
    Query(query): Query<SlotSelector>,
    body: Option<Json<SlotSelector>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let slot_id = body
        .and_then(|Json(b)| b.time_slot_id)
        .or(query.time_slot_id);

    remove_registrations(&state.db, &user.id, &event_id, slot_id.as_deref()).await?;

    tracing::info!(event_id = %event_id, user_id = %user.id, "Deregistered");
    Ok(Json(MessageResponse::new("Deregistered")))
}

/// List an event's attendees. Creator only.
///
/// GET /api/events/:id/attendees
pub async fn list_attendees(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Attendee>>, ApiError> {
    let event = fetch_event(&state.db, &event_id).await?;
    ensure_creator(&event, &user)?;

    let rows: Vec<Attendee> = sqlx::query_as(
        "SELECT u.id, u.username, u.email, r.status, r.created_at, ts.start_time AS time_slot
         FROM registrations r
         JOIN users u ON r.user_id = u.id
         LEFT JOIN time_slots ts ON r.time_slot_id = ts.id
         WHERE r.event_id = ?
         ORDER BY r.created_at DESC",
    )
    .bind(&event.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Set an attendee's registration status. Creator only; any of the three
/// statuses is reachable from any other.
pub(crate) async fn set_attendee_status(
    db: &DbPool,
    event_id: &str,
    attendee_id: &str,
    status: RegistrationStatus,
) -> Result<(), ApiError> {
    let result = sqlx::query("UPDATE registrations SET status = ? WHERE user_id = ? AND event_id = ?")
        .bind(status.as_str())
        .bind(attendee_id)
        .bind(event_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Registration not found"));
    }
    Ok(())
}

/// Update an attendee's status.
///
/// PUT /api/events/:id/attendees/:userId
pub async fn update_attendee_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((event_id, attendee_id)): Path<(String, String)>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let status = RegistrationStatus::parse(&request.status)
        .ok_or_else(|| ApiError::validation("Invalid status"))?;

    let event = fetch_event(&state.db, &event_id).await?;
    ensure_creator(&event, &user)?;

    set_attendee_status(&state.db, &event.id, &attendee_id, status).await?;

    tracing::info!(event_id = %event_id, attendee = %attendee_id, status = %status, "Attendee status updated");
    Ok(Json(MessageResponse::new("Updated")))
}
