//! Registration models and the three-value status enum.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub user_id: String,
    pub event_id: String,
    pub time_slot_id: String,
    pub status: String,
    pub created_at: String,
}

/// Registration status. Any value is reachable from any other; there is no
/// transition table beyond the enum itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attendee list row, visible to the event creator only.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub id: String,
    pub username: String,
    pub email: String,
    pub status: String,
    pub created_at: String,
    pub time_slot: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "approved", "rejected"] {
            assert_eq!(RegistrationStatus::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!(RegistrationStatus::parse("waitlisted").is_none());
        assert!(RegistrationStatus::parse("").is_none());
        assert!(RegistrationStatus::parse("Approved").is_none());
    }
}
