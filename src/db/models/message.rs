//! Direct and group message models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub event_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Thread row with the sender's display name joined in.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithSender {
    pub id: String,
    pub event_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
    pub sender_name: String,
}

/// One conversation-list entry: the latest message exchanged with a
/// counterpart, regardless of direction, plus the unread count from them.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub content: String,
    pub created_at: String,
    pub event_id: String,
    pub event_title: String,
    pub other_user_id: String,
    pub other_user_name: String,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: String,
    pub event_id: String,
    pub time_slot_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageWithSender {
    pub id: String,
    pub event_id: String,
    pub time_slot_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
    pub sender_name: String,
}

/// Group chat member: the event creator (Organizer) or a non-rejected
/// registrant of the slot (Attendee).
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: String,
    pub username: String,
    pub group_role: String,
}
