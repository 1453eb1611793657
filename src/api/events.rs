//! Event catalog: browse, create, update, delete.
//!
//! Create and update accept multipart forms (text fields plus up to ten
//! media files). Field spellings from both client generations (camelCase
//! and snake_case) are accepted and normalized into [`EventForm`] at the
//! boundary; nothing past the parser sees the dual spelling.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::{AuthUser, MessageResponse};
use crate::api::error::ApiError;
use crate::db::{
    DbPool, Event, EventDetail, EventMedia, EventSummary, RegisteredEvent, TimeSlotWithCount,
};
use crate::storage::{StoredFile, DEFAULT_EVENT_IMAGE};
use crate::util::now_rfc3339;
use crate::AppState;

// -------------------------------------------------------------------------
// Form normalization
// -------------------------------------------------------------------------

/// Normalized create/update payload.
#[derive(Debug, Default)]
pub(crate) struct EventForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub requires_approval: bool,
    /// Raw JSON array of slots, parsed later
    pub time_slots: Option<String>,
    /// Fallback start date used when no slot list was submitted
    pub date: Option<String>,
    pub files: Vec<StoredFile>,
}

/// One submitted time slot. `id` is only meaningful on update, where it
/// selects the existing slot to reconcile against.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SlotInput {
    pub id: Option<String>,
    #[serde(alias = "start_time")]
    pub start_time: Option<String>,
    #[serde(alias = "duration_minutes")]
    pub duration_minutes: Option<i64>,
    #[serde(alias = "max_attendees")]
    pub max_attendees: Option<i64>,
}

const DEFAULT_SLOT_DURATION: i64 = 60;
const DEFAULT_SLOT_CAPACITY: i64 = 5;

/// Parse the submitted slot list. An absent, empty, or unparsable list
/// yields exactly one default slot starting at `default_date` (or now).
pub(crate) fn parse_time_slots(raw: Option<&str>, default_date: Option<&str>) -> Vec<SlotInput> {
    let parsed: Vec<SlotInput> = raw
        .and_then(|s| match serde_json::from_str(s) {
            Ok(slots) => Some(slots),
            Err(e) => {
                tracing::warn!("Failed to parse time slots: {}", e);
                None
            }
        })
        .unwrap_or_default();

    if parsed.is_empty() {
        let start = default_date
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(now_rfc3339);
        return vec![SlotInput {
            id: None,
            start_time: Some(start),
            duration_minutes: Some(DEFAULT_SLOT_DURATION),
            max_attendees: Some(DEFAULT_SLOT_CAPACITY),
        }];
    }
    parsed
}

/// Read a multipart request into a normalized form, storing files as they
/// stream in.
async fn read_event_form(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<EventForm, ApiError> {
    let mut form = EventForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if let Some(file_name) = field.file_name().map(ToString::to_string) {
            if form.files.len() >= state.config.storage.max_files {
                return Err(ApiError::validation(format!(
                    "At most {} files per upload",
                    state.config.storage.max_files
                )));
            }
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
            if bytes.len() > state.config.storage.max_file_bytes {
                return Err(ApiError::validation(format!(
                    "File {} exceeds the {} byte limit",
                    file_name, state.config.storage.max_file_bytes
                )));
            }
            let stored = state
                .storage
                .store(&file_name, &content_type, &bytes)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to store media file: {}", e);
                    ApiError::internal("Failed to store uploaded file")
                })?;
            form.files.push(stored);
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed multipart field: {}", e)))?;

        match name.as_str() {
            "title" => form.title = Some(value),
            "description" => form.description = Some(value),
            "locationName" | "location_name" => form.location_name = Some(value),
            "latitude" => form.latitude = value.parse().ok(),
            "longitude" => form.longitude = value.parse().ok(),
            "requiresApproval" | "requires_approval" => {
                form.requires_approval = value == "true";
            }
            "timeSlots" | "time_slots" => form.time_slots = Some(value),
            "date" => form.date = Some(value),
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// First uploaded image, or the default placeholder.
fn primary_image(files: &[StoredFile]) -> String {
    files
        .iter()
        .find(|f| f.is_image())
        .map(|f| f.url.clone())
        .unwrap_or_else(|| DEFAULT_EVENT_IMAGE.to_string())
}

// -------------------------------------------------------------------------
// Shared lookups
// -------------------------------------------------------------------------

pub(crate) async fn fetch_event(db: &DbPool, id: &str) -> Result<Event, ApiError> {
    let event: Option<Event> = sqlx::query_as("SELECT * FROM events WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    event.ok_or_else(|| ApiError::not_found("Event not found"))
}

pub(crate) fn ensure_creator(event: &Event, user: &AuthUser) -> Result<(), ApiError> {
    if event.created_by == user.id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the event creator may do this"))
    }
}

// -------------------------------------------------------------------------
// Read endpoints
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub(crate) async fn list_events_page(
    db: &DbPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<EventSummary>, ApiError> {
    let rows: Vec<EventSummary> = sqlx::query_as(
        "SELECT e.*, u.username AS creator_name,
            (SELECT MIN(start_time) FROM time_slots ts WHERE ts.event_id = e.id) AS date,
            (SELECT COUNT(*) FROM registrations r
             JOIN time_slots ts ON r.time_slot_id = ts.id
             WHERE ts.event_id = e.id AND r.status = 'approved') AS attendee_count
         FROM events e
         LEFT JOIN users u ON e.created_by = u.id
         ORDER BY date ASC
         LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// List events, earliest upcoming slot first.
///
/// GET /api/events?limit&offset
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<EventSummary>>, ApiError> {
    let limit = page.limit.unwrap_or(20).clamp(1, 100);
    let offset = page.offset.unwrap_or(0).max(0);
    Ok(Json(list_events_page(&state.db, limit, offset).await?))
}

/// Fetch one event with its slots and media.
///
/// GET /api/events/:id
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EventDetail>, ApiError> {
    let event = fetch_event(&state.db, &id).await?;

    let creator_name: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE id = ?")
        .bind(&event.created_by)
        .fetch_optional(&state.db)
        .await?;

    let time_slots: Vec<TimeSlotWithCount> = sqlx::query_as(
        "SELECT id, start_time, duration_minutes, max_attendees,
            (SELECT COUNT(*) FROM registrations r
             WHERE r.time_slot_id = time_slots.id AND r.status = 'approved') AS attendee_count
         FROM time_slots
         WHERE event_id = ?
         ORDER BY start_time ASC",
    )
    .bind(&event.id)
    .fetch_all(&state.db)
    .await?;

    let media: Vec<EventMedia> = sqlx::query_as(
        "SELECT * FROM event_media WHERE event_id = ? ORDER BY created_at ASC",
    )
    .bind(&event.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(EventDetail {
        event,
        creator_name: creator_name.map(|(name,)| name),
        time_slots,
        media,
    }))
}

/// Events the caller registered for, one row per registration.
///
/// GET /api/events/registered/me
pub async fn registered_events(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<RegisteredEvent>>, ApiError> {
    let rows: Vec<RegisteredEvent> = sqlx::query_as(
        "SELECT e.id, e.title, e.description, e.location_name, e.image_url,
                e.requires_approval, r.status, ts.start_time AS date, ts.id AS time_slot_id
         FROM events e
         JOIN time_slots ts ON e.id = ts.event_id
         JOIN registrations r ON ts.id = r.time_slot_id
         WHERE r.user_id = ?
         ORDER BY ts.start_time ASC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// Events the caller hosts.
///
/// GET /api/events/hosted/me
pub async fn hosted_events(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<EventSummary>>, ApiError> {
    let rows: Vec<EventSummary> = sqlx::query_as(
        "SELECT e.*, u.username AS creator_name,
            (SELECT MIN(start_time) FROM time_slots ts WHERE ts.event_id = e.id) AS date,
            (SELECT COUNT(*) FROM registrations r
             JOIN time_slots ts ON r.time_slot_id = ts.id
             WHERE ts.event_id = e.id AND r.status = 'approved') AS attendee_count
         FROM events e
         LEFT JOIN users u ON e.created_by = u.id
         WHERE e.created_by = ?
         ORDER BY date ASC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

// -------------------------------------------------------------------------
// Write endpoints
// -------------------------------------------------------------------------

/// Insert an event with its slots and media, all in one transaction.
pub(crate) async fn create_event_record(
    db: &DbPool,
    user_id: &str,
    form: &EventForm,
) -> Result<Event, ApiError> {
    let title = form
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Title is required"))?;

    let mut tx = db.begin().await?;

    let event: Event = sqlx::query_as(
        "INSERT INTO events (id, title, description, location_name, latitude, longitude,
                             created_by, image_url, requires_approval, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(title)
    .bind(&form.description)
    .bind(&form.location_name)
    .bind(form.latitude)
    .bind(form.longitude)
    .bind(user_id)
    .bind(primary_image(&form.files))
    .bind(form.requires_approval)
    .bind(now_rfc3339())
    .fetch_one(&mut *tx)
    .await?;

    for slot in parse_time_slots(form.time_slots.as_deref(), form.date.as_deref()) {
        let Some(start_time) = slot.start_time else {
            tracing::warn!("Skipping slot with missing start time");
            continue;
        };
        sqlx::query(
            "INSERT INTO time_slots (id, event_id, start_time, duration_minutes, max_attendees, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&event.id)
        .bind(&start_time)
        .bind(slot.duration_minutes.unwrap_or(DEFAULT_SLOT_DURATION))
        .bind(slot.max_attendees.unwrap_or(DEFAULT_SLOT_CAPACITY))
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    for file in &form.files {
        sqlx::query(
            "INSERT INTO event_media (id, event_id, media_url, media_type, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&event.id)
        .bind(&file.url)
        .bind(&file.media_type)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(event)
}

/// Create an event.
///
/// POST /api/events
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let form = read_event_form(&state, &mut multipart).await?;
    let event = create_event_record(&state.db, &user.id, &form).await?;
    tracing::info!(event_id = %event.id, creator = %user.id, "Event created");
    Ok((StatusCode::CREATED, Json(event)))
}

/// Apply an update to an existing event.
///
/// Slots are reconciled by id: submitted slots carrying a known id are
/// updated in place, slots without one are inserted, and existing slots
/// absent from the submission are deleted along with their registrations.
/// Registrations on surviving slots are preserved.
pub(crate) async fn apply_event_update(
    db: &DbPool,
    event: &Event,
    form: &EventForm,
) -> Result<(), ApiError> {
    let title = form
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Title is required"))?;

    let mut tx = db.begin().await?;

    // Primary image changes only when a new image file arrived
    let new_image = form.files.iter().find(|f| f.is_image());
    match new_image {
        Some(image) => {
            sqlx::query(
                "UPDATE events SET title = ?, description = ?, location_name = ?,
                 latitude = ?, longitude = ?, requires_approval = ?, image_url = ?
                 WHERE id = ?",
            )
            .bind(title)
            .bind(&form.description)
            .bind(&form.location_name)
            .bind(form.latitude)
            .bind(form.longitude)
            .bind(form.requires_approval)
            .bind(&image.url)
            .bind(&event.id)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query(
                "UPDATE events SET title = ?, description = ?, location_name = ?,
                 latitude = ?, longitude = ?, requires_approval = ?
                 WHERE id = ?",
            )
            .bind(title)
            .bind(&form.description)
            .bind(&form.location_name)
            .bind(form.latitude)
            .bind(form.longitude)
            .bind(form.requires_approval)
            .bind(&event.id)
            .execute(&mut *tx)
            .await?;
        }
    }

    if form.time_slots.is_some() {
        let submitted = parse_time_slots(form.time_slots.as_deref(), form.date.as_deref());

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM time_slots WHERE event_id = ?")
                .bind(&event.id)
                .fetch_all(&mut *tx)
                .await?;
        let existing: std::collections::HashSet<String> =
            existing.into_iter().map(|(id,)| id).collect();

        let mut kept: std::collections::HashSet<String> = Default::default();
        for slot in submitted {
            let Some(start_time) = slot.start_time else {
                tracing::warn!("Skipping slot with missing start time");
                continue;
            };
            let duration = slot.duration_minutes.unwrap_or(DEFAULT_SLOT_DURATION);
            let capacity = slot.max_attendees.unwrap_or(DEFAULT_SLOT_CAPACITY);

            match slot.id.filter(|id| existing.contains(id)) {
                Some(id) => {
                    sqlx::query(
                        "UPDATE time_slots SET start_time = ?, duration_minutes = ?, max_attendees = ?
                         WHERE id = ?",
                    )
                    .bind(&start_time)
                    .bind(duration)
                    .bind(capacity)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
                    kept.insert(id);
                }
                None => {
                    sqlx::query(
                        "INSERT INTO time_slots (id, event_id, start_time, duration_minutes, max_attendees, created_at)
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(uuid::Uuid::new_v4().to_string())
                    .bind(&event.id)
                    .bind(&start_time)
                    .bind(duration)
                    .bind(capacity)
                    .bind(now_rfc3339())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        for id in existing.difference(&kept) {
            sqlx::query("DELETE FROM time_slots WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            // The foreign_keys pragma is per-connection in SQLite, so don't
            // rely on cascades: remove dependents explicitly
            sqlx::query("DELETE FROM registrations WHERE time_slot_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM group_messages WHERE time_slot_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
    }

    if !form.files.is_empty() {
        sqlx::query("DELETE FROM event_media WHERE event_id = ?")
            .bind(&event.id)
            .execute(&mut *tx)
            .await?;
        for file in &form.files {
            sqlx::query(
                "INSERT INTO event_media (id, event_id, media_url, media_type, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&event.id)
            .bind(&file.url)
            .bind(&file.media_type)
            .bind(now_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Update an event. Creator only.
///
/// PUT /api/events/:id
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let event = fetch_event(&state.db, &id).await?;
    ensure_creator(&event, &user)?;

    let form = read_event_form(&state, &mut multipart).await?;
    apply_event_update(&state.db, &event, &form).await?;

    tracing::info!(event_id = %id, "Event updated");
    Ok(Json(MessageResponse::new("Updated")))
}

/// Delete an event and everything hanging off it, in one transaction.
pub(crate) async fn delete_event_record(db: &DbPool, event_id: &str) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM event_media WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM messages WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM group_messages WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM registrations WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM time_slots WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Delete an event. Creator only.
///
/// DELETE /api/events/:id
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let event = fetch_event(&state.db, &id).await?;
    ensure_creator(&event, &user)?;

    delete_event_record(&state.db, &id).await?;

    tracing::info!(event_id = %id, "Event deleted");
    Ok(Json(MessageResponse::new("Deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn seed_user(pool: &DbPool, name: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
             VALUES (?, ?, ?, 'x', 'user', ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(format!("{}@example.com", name))
        .bind(now_rfc3339())
        .bind(now_rfc3339())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    fn form_with_slots(title: &str, slots: Option<&str>) -> EventForm {
        EventForm {
            title: Some(title.to_string()),
            time_slots: slots.map(ToString::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_time_slots_both_casings() {
        let raw = r#"[{"startTime":"2026-09-01T18:00:00+00:00","durationMinutes":90,"maxAttendees":10},
                      {"start_time":"2026-09-02T18:00:00+00:00","duration_minutes":30,"max_attendees":2}]"#;
        let slots = parse_time_slots(Some(raw), None);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].duration_minutes, Some(90));
        assert_eq!(slots[1].max_attendees, Some(2));
    }

    #[test]
    fn test_parse_time_slots_synthesizes_default() {
        for raw in [None, Some("[]"), Some("not json")] {
            let slots = parse_time_slots(raw, None);
            assert_eq!(slots.len(), 1);
            assert_eq!(slots[0].duration_minutes, Some(60));
            assert_eq!(slots[0].max_attendees, Some(5));
            assert!(slots[0].start_time.is_some());
        }
    }

    #[test]
    fn test_parse_time_slots_default_uses_submitted_date() {
        let slots = parse_time_slots(None, Some("2026-12-24T10:00:00+00:00"));
        assert_eq!(slots.len(), 1);
        assert_eq!(
            slots[0].start_time.as_deref(),
            Some("2026-12-24T10:00:00+00:00")
        );
    }

    #[test]
    fn test_primary_image_prefers_first_image() {
        let files = vec![
            StoredFile {
                url: "/media/clip.mp4".into(),
                media_type: "video".into(),
            },
            StoredFile {
                url: "/media/flyer.png".into(),
                media_type: "image".into(),
            },
        ];
        assert_eq!(primary_image(&files), "/media/flyer.png");
        assert_eq!(primary_image(&[]), DEFAULT_EVENT_IMAGE);
    }

    #[tokio::test]
    async fn test_create_event_synthesizes_single_default_slot() {
        let pool = db::init_in_memory().await.unwrap();
        let user = seed_user(&pool, "alice").await;

        let event = create_event_record(&pool, &user, &form_with_slots("Picnic", None))
            .await
            .unwrap();

        let slots: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT id, duration_minutes, max_attendees FROM time_slots WHERE event_id = ?",
        )
        .bind(&event.id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].1, 60);
        assert_eq!(slots[0].2, 5);
    }

    #[tokio::test]
    async fn test_create_event_requires_title() {
        let pool = db::init_in_memory().await.unwrap();
        let user = seed_user(&pool, "alice").await;

        let err = create_event_record(&pool, &user, &EventForm::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::api::error::ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_update_reconciles_slots_by_id() {
        let pool = db::init_in_memory().await.unwrap();
        let user = seed_user(&pool, "alice").await;
        let attendee = seed_user(&pool, "bob").await;

        let raw = r#"[{"startTime":"2026-09-01T18:00:00+00:00"},{"startTime":"2026-09-02T18:00:00+00:00"}]"#;
        let event = create_event_record(&pool, &user, &form_with_slots("Show", Some(raw)))
            .await
            .unwrap();

        let slot_ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM time_slots WHERE event_id = ? ORDER BY start_time ASC",
        )
        .bind(&event.id)
        .fetch_all(&pool)
        .await
        .unwrap();
        let (keep_id, drop_id) = (slot_ids[0].0.clone(), slot_ids[1].0.clone());

        // Register bob on the slot that survives the update
        sqlx::query(
            "INSERT INTO registrations (user_id, event_id, time_slot_id, status, created_at)
             VALUES (?, ?, ?, 'approved', ?)",
        )
        .bind(&attendee)
        .bind(&event.id)
        .bind(&keep_id)
        .bind(now_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        // Resubmit the kept slot (edited) plus a brand new one; omit the other
        let update_raw = format!(
            r#"[{{"id":"{}","startTime":"2026-09-01T19:00:00+00:00","maxAttendees":20}},
                {{"startTime":"2026-09-03T18:00:00+00:00"}}]"#,
            keep_id
        );
        let form = form_with_slots("Show", Some(&update_raw));
        apply_event_update(&pool, &event, &form).await.unwrap();

        let remaining: Vec<(String, i64)> = sqlx::query_as(
            "SELECT id, max_attendees FROM time_slots WHERE event_id = ? ORDER BY start_time ASC",
        )
        .bind(&event.id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].0, keep_id);
        assert_eq!(remaining[0].1, 20);
        assert!(remaining.iter().all(|(id, _)| id != &drop_id));

        // Registration on the surviving slot is intact
        let regs: Vec<(String,)> =
            sqlx::query_as("SELECT time_slot_id FROM registrations WHERE user_id = ?")
                .bind(&attendee)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].0, keep_id);
    }

    #[tokio::test]
    async fn test_delete_event_removes_all_children() {
        let pool = db::init_in_memory().await.unwrap();
        let user = seed_user(&pool, "alice").await;
        let other = seed_user(&pool, "bob").await;

        let event = create_event_record(&pool, &user, &form_with_slots("Gone", None))
            .await
            .unwrap();
        let (slot_id,): (String,) =
            sqlx::query_as("SELECT id FROM time_slots WHERE event_id = ?")
                .bind(&event.id)
                .fetch_one(&pool)
                .await
                .unwrap();

        sqlx::query(
            "INSERT INTO registrations (user_id, event_id, time_slot_id, status, created_at)
             VALUES (?, ?, ?, 'approved', ?)",
        )
        .bind(&other)
        .bind(&event.id)
        .bind(&slot_id)
        .bind(now_rfc3339())
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO messages (id, event_id, sender_id, receiver_id, content, created_at)
             VALUES (?, ?, ?, ?, 'hi', ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&event.id)
        .bind(&other)
        .bind(&user)
        .bind(now_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        delete_event_record(&pool, &event.id).await.unwrap();

        for table in [
            "events",
            "time_slots",
            "event_media",
            "registrations",
            "messages",
            "group_messages",
        ] {
            let col = if table == "events" { "id" } else { "event_id" };
            let (count,): (i64,) = sqlx::query_as(&format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?",
                table, col
            ))
            .bind(&event.id)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 0, "table {} still references the event", table);
        }
    }

    #[tokio::test]
    async fn test_only_the_creator_passes_the_ownership_check() {
        let pool = db::init_in_memory().await.unwrap();
        let alice = seed_user(&pool, "alice").await;
        let event = create_event_record(&pool, &alice, &form_with_slots("Mine", None))
            .await
            .unwrap();

        let owner = crate::api::auth::AuthUser {
            id: alice.clone(),
            role: "user".to_string(),
        };
        assert!(ensure_creator(&event, &owner).is_ok());

        let stranger = crate::api::auth::AuthUser {
            id: "someone-else".to_string(),
            role: "user".to_string(),
        };
        let err = ensure_creator(&event, &stranger).unwrap_err();
        assert_eq!(err.code(), crate::api::error::ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_list_events_orders_by_earliest_slot() {
        let pool = db::init_in_memory().await.unwrap();
        let user = seed_user(&pool, "alice").await;

        let later = r#"[{"startTime":"2026-10-01T10:00:00+00:00"}]"#;
        let sooner = r#"[{"startTime":"2026-09-01T10:00:00+00:00"}]"#;
        create_event_record(&pool, &user, &form_with_slots("Later", Some(later)))
            .await
            .unwrap();
        create_event_record(&pool, &user, &form_with_slots("Sooner", Some(sooner)))
            .await
            .unwrap();

        let rows = list_events_page(&pool, 20, 0).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Sooner");
        assert_eq!(rows[1].title, "Later");
        assert_eq!(rows[0].creator_name.as_deref(), Some("alice"));
        assert_eq!(rows[0].attendee_count, 0);
    }
}
