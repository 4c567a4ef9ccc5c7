use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::livekit::ParticipantSummary;
use crate::models::User;

/// Room row. `room_id` is the name LiveKit knows the room by.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub room_id: String,
    pub description: Option<String>,
    pub creator_id: i64,
    pub is_active: bool,
    pub max_participants: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn status(&self) -> RoomStatus {
        if self.is_active {
            RoomStatus::Active
        } else {
            RoomStatus::Inactive
        }
    }
}

/// Room lifecycle. `Inactive` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Inactive,
}

/// One presence of a user in a room (`room_participants` row)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Membership {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_connected: bool,
}

/// Request to create a room
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_max_participants")]
    pub max_participants: i64,
}

pub fn default_max_participants() -> i64 {
    50
}

/// Room information returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct RoomWithParticipants {
    #[serde(flatten)]
    pub room: Room,
    pub status: RoomStatus,
    pub participants_count: i64,
    pub creator: User,
}

/// Response after joining a room
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub token: String,
    pub room_url: String,
}

#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub participants: Vec<ParticipantSummary>,
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
