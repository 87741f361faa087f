use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use super::participant::Participant;
use super::room_option::RoomOption;
use crate::validation::{ROOM_CODE_ALPHABET, ROOM_CODE_LENGTH};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "room_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Eat,
    Watch,
    Do,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Eat => "eat",
            Category::Watch => "watch",
            Category::Do => "do",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCategory;

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eat" => Ok(Category::Eat),
            "watch" => Ok(Category::Watch),
            "do" => Ok(Category::Do),
            _ => Err(UnknownCategory),
        }
    }
}

/// Rooms move from `Gathering` to `Decided` exactly once, when the host spins.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "room_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Gathering,
    Decided,
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: i64,
    pub code: String,
    pub category: Category,
    pub status: RoomStatus,
    pub winner_option_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn is_gathering(&self) -> bool {
        self.status == RoomStatus::Gathering
    }
}

/// Everything a polling client needs to render a room.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomState {
    pub room: Room,
    pub participants: Vec<Participant>,
    pub options: Vec<RoomOption>,
}

#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
pub struct RecentDecision {
    pub id: i64,
    pub code: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub winner_text: String,
    pub winner_participant: String,
    pub participant_count: i64,
}

/// Draws a fresh code from the OS random source. Uniqueness is checked by
/// the caller against stored rooms.
pub fn generate_room_code() -> String {
    let mut rng = OsRng;
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_room_code;
    use std::collections::HashSet;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..500 {
            let code = generate_room_code();
            assert!(validate_room_code(&code), "bad code {code}");
        }
    }

    #[test]
    fn generated_codes_vary() {
        let codes: HashSet<String> = (0..200).map(|_| generate_room_code()).collect();
        assert!(codes.len() > 190);
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in [Category::Eat, Category::Watch, Category::Do] {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert_eq!("EAT".parse::<Category>(), Err(UnknownCategory));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RoomStatus::Gathering).unwrap(),
            "\"gathering\""
        );
        assert_eq!(
            serde_json::to_string(&RoomStatus::Decided).unwrap(),
            "\"decided\""
        );
    }
}
