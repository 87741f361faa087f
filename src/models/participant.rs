use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::room::Room;

#[derive(Clone, Debug, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: i64,
    pub room_id: i64,
    pub name: String,
    pub is_host: bool,
    pub has_vetoed: bool,
    pub created_at: DateTime<Utc>,
}

/// A participant together with the room they belong to, as read at the
/// start of a mutating transaction.
#[derive(Clone, Debug)]
pub struct Membership {
    pub room: Room,
    pub participant: Participant,
}
