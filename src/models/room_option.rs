use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A candidate choice submitted to a room.
#[derive(Clone, Debug, FromRow, Serialize, Deserialize, PartialEq)]
pub struct RoomOption {
    pub id: i64,
    pub room_id: i64,
    pub participant_id: i64,
    pub text: String,
    pub is_vetoed: bool,
    pub vetoed_by_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
