//! Event catalog models: events, time slots, media.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_by: String,
    pub image_url: String,
    pub requires_approval: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: String,
    pub event_id: String,
    pub start_time: String,
    pub duration_minutes: i64,
    pub max_attendees: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventMedia {
    pub id: String,
    pub event_id: String,
    pub media_url: String,
    pub media_type: String,
    pub created_at: String,
}

/// Catalog list row: event plus its creator's name, the earliest slot start
/// (`date`) and the approved attendee count across all slots.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_by: String,
    pub image_url: String,
    pub requires_approval: bool,
    pub created_at: String,
    pub creator_name: Option<String>,
    pub date: Option<String>,
    pub attendee_count: i64,
}

/// Time slot annotated with its own approved attendee count.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotWithCount {
    pub id: String,
    pub start_time: String,
    pub duration_minutes: i64,
    pub max_attendees: i64,
    pub attendee_count: i64,
}

/// Full single-event view: slots and media included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub creator_name: Option<String>,
    pub time_slots: Vec<TimeSlotWithCount>,
    pub media: Vec<EventMedia>,
}

/// Row for "events I registered for": one row per registration.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub image_url: String,
    pub requires_approval: bool,
    pub status: String,
    pub date: String,
    pub time_slot_id: String,
}
