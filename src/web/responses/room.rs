use serde::Serialize;

use crate::engine::{SpinOutcome, Winner};
use crate::models::room_option::RoomOption;

#[derive(Serialize, Debug)]
pub struct CreateRoomResponse {
    pub code: String,
}

#[derive(Serialize, Debug)]
pub struct JoinRoomResponse {
    pub success: bool,
}

#[derive(Serialize, Debug)]
pub struct AddOptionResponse {
    pub option: RoomOption,
    pub message: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SpinResponse {
    pub winner: Winner,
    pub winner_index: usize,
    pub total_options: usize,
    pub all_options: Vec<RoomOption>,
    pub message: String,
}

impl From<SpinOutcome> for SpinResponse {
    fn from(outcome: SpinOutcome) -> Self {
        Self {
            winner: outcome.winner,
            winner_index: outcome.winner_index,
            total_options: outcome.total_options,
            all_options: outcome.all_options,
            message: "Spin complete!".to_string(),
        }
    }
}
