//! Room lifecycle and decision rules.
//!
//! A room is `gathering` until its host spins, after which it is `decided`
//! for good. Each operation below runs in exactly one store transaction and
//! re-checks all of its preconditions inside it, so a failed or interrupted
//! call can simply be retried by the caller.

use rand::rngs::OsRng;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::room::{generate_room_code, RecentDecision, RoomState};
use crate::models::room_option::RoomOption;
use crate::session::create_session;
use crate::store::{Store, StoreError};
use crate::validation::{
    validate_category, validate_name, validate_option_text, validate_room_code,
};

pub const MAX_OPTIONS_PER_PARTICIPANT: i64 = 3;
pub const MIN_OPTIONS_TO_SPIN: usize = 2;
pub const CODE_GENERATION_ATTEMPTS: usize = 3;
pub const RECENT_DECISIONS_LIMIT: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid category, must be eat, watch, or do")]
    InvalidCategory,
    #[error("name must be between 1 and 50 characters")]
    InvalidName,
    #[error("invalid room code format")]
    InvalidRoomCode,
    #[error("option text must be between 1 and 100 characters")]
    InvalidOptionText,
    #[error("failed to generate a unique room code")]
    CodeGenerationFailed,
    #[error("room not found or access denied")]
    RoomNotFound,
    #[error("this name is already taken")]
    DuplicateName,
    #[error("room is no longer accepting changes")]
    RoomLocked,
    #[error("you have already added 3 options")]
    OptionLimitReached,
    #[error("option not found")]
    OptionNotFound,
    #[error("you cannot veto your own option")]
    CannotVetoOwn,
    #[error("this option has already been vetoed")]
    AlreadyVetoed,
    #[error("you have already used your veto")]
    AlreadyUsedVeto,
    #[error("only the host can spin the wheel")]
    NotHost,
    #[error("room has already been spun")]
    AlreadySpun,
    #[error("need at least 2 non-vetoed options to spin")]
    InsufficientOptions,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidCategory => "INVALID_CATEGORY",
            EngineError::InvalidName => "INVALID_NAME",
            EngineError::InvalidRoomCode => "INVALID_ROOM_CODE",
            EngineError::InvalidOptionText => "INVALID_OPTION_TEXT",
            EngineError::CodeGenerationFailed => "CODE_GENERATION_FAILED",
            EngineError::RoomNotFound => "ROOM_NOT_FOUND",
            EngineError::DuplicateName => "DUPLICATE_NAME",
            EngineError::RoomLocked => "ROOM_LOCKED",
            EngineError::OptionLimitReached => "OPTION_LIMIT_REACHED",
            EngineError::OptionNotFound => "OPTION_NOT_FOUND",
            EngineError::CannotVetoOwn => "CANNOT_VETO_OWN",
            EngineError::AlreadyVetoed => "ALREADY_VETOED",
            EngineError::AlreadyUsedVeto => "ALREADY_USED_VETO",
            EngineError::NotHost => "NOT_HOST",
            EngineError::AlreadySpun => "ALREADY_SPUN",
            EngineError::InsufficientOptions => "INSUFFICIENT_OPTIONS",
            EngineError::Storage(_) => "SERVER_ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub code: String,
    pub participant_id: i64,
    pub session_token: String,
}

#[derive(Debug, Clone)]
pub struct JoinedRoom {
    pub participant_id: i64,
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Winner {
    pub id: i64,
    pub text: String,
    pub participant_id: i64,
    pub participant_name: String,
}

/// Result of a spin. `all_options` holds the non-vetoed options in creation
/// order and `all_options[winner_index]` is the winner.
#[derive(Debug, Clone)]
pub struct SpinOutcome {
    pub winner: Winner,
    pub winner_index: usize,
    pub total_options: usize,
    pub all_options: Vec<RoomOption>,
}

pub async fn create_room(
    store: &dyn Store,
    category: &str,
    host_name: &str,
) -> Result<CreatedRoom, EngineError> {
    let category = validate_category(category).ok_or(EngineError::InvalidCategory)?;
    let name = validate_name(host_name);
    if !name.is_valid {
        return Err(EngineError::InvalidName);
    }

    let mut tx = store.begin().await?;

    let mut room = None;
    for attempt in 1..=CODE_GENERATION_ATTEMPTS {
        let candidate = generate_room_code();
        match tx.insert_room(&candidate, category).await? {
            Some(inserted) => {
                room = Some(inserted);
                break;
            }
            None => warn!("room code collision on attempt {}: {}", attempt, candidate),
        }
    }
    let room = room.ok_or(EngineError::CodeGenerationFailed)?;

    let host = tx
        .insert_participant(room.id, name.trimmed, true)
        .await?
        .ok_or(EngineError::DuplicateName)?;
    let session_token = create_session(&mut *tx, host.id).await?;

    tx.commit().await?;

    info!("room {} created ({}) by participant {}", room.code, category, host.id);

    Ok(CreatedRoom {
        code: room.code,
        participant_id: host.id,
        session_token,
    })
}

/// Joining is allowed in any room status; late joiners just observe.
pub async fn join_room(
    store: &dyn Store,
    code: &str,
    name: &str,
) -> Result<JoinedRoom, EngineError> {
    if !validate_room_code(code) {
        return Err(EngineError::InvalidRoomCode);
    }
    let name = validate_name(name);
    if !name.is_valid {
        return Err(EngineError::InvalidName);
    }

    let mut tx = store.begin().await?;

    let room = tx
        .find_room_by_code(code)
        .await?
        .ok_or(EngineError::RoomNotFound)?;
    let participant = tx
        .insert_participant(room.id, name.trimmed, false)
        .await?
        .ok_or(EngineError::DuplicateName)?;
    let session_token = create_session(&mut *tx, participant.id).await?;

    tx.commit().await?;

    info!("participant {} joined room {}", participant.id, room.code);

    Ok(JoinedRoom {
        participant_id: participant.id,
        session_token,
    })
}

pub async fn get_room_state(store: &dyn Store, code: &str) -> Result<RoomState, EngineError> {
    if !validate_room_code(code) {
        return Err(EngineError::InvalidRoomCode);
    }

    let mut tx = store.begin().await?;

    let room = tx
        .find_room_by_code(code)
        .await?
        .ok_or(EngineError::RoomNotFound)?;
    let participants = tx.list_participants(room.id).await?;
    let options = tx.list_options(room.id).await?;

    tx.commit().await?;

    Ok(RoomState {
        room,
        participants,
        options,
    })
}

pub async fn add_option(
    store: &dyn Store,
    code: &str,
    participant_id: i64,
    text: &str,
) -> Result<RoomOption, EngineError> {
    if !validate_room_code(code) {
        return Err(EngineError::InvalidRoomCode);
    }
    let text = validate_option_text(text);
    if !text.is_valid {
        return Err(EngineError::InvalidOptionText);
    }

    let mut tx = store.begin().await?;

    let membership = tx
        .lock_membership(code, participant_id)
        .await?
        .ok_or(EngineError::RoomNotFound)?;
    if !membership.room.is_gathering() {
        return Err(EngineError::RoomLocked);
    }

    let existing = tx
        .count_options_by(membership.room.id, participant_id)
        .await?;
    if existing >= MAX_OPTIONS_PER_PARTICIPANT {
        return Err(EngineError::OptionLimitReached);
    }

    let option = tx
        .insert_option(membership.room.id, participant_id, text.trimmed)
        .await?;

    tx.commit().await?;

    Ok(option)
}

pub async fn veto_option(
    store: &dyn Store,
    code: &str,
    option_id: i64,
    participant_id: i64,
) -> Result<(), EngineError> {
    if !validate_room_code(code) {
        return Err(EngineError::InvalidRoomCode);
    }

    let mut tx = store.begin().await?;

    let membership = tx
        .lock_membership(code, participant_id)
        .await?
        .ok_or(EngineError::RoomNotFound)?;
    if !membership.room.is_gathering() {
        return Err(EngineError::RoomLocked);
    }

    let option = tx
        .find_option(membership.room.id, option_id)
        .await?
        .ok_or(EngineError::OptionNotFound)?;
    if option.participant_id == participant_id {
        return Err(EngineError::CannotVetoOwn);
    }
    if option.is_vetoed {
        return Err(EngineError::AlreadyVetoed);
    }
    if membership.participant.has_vetoed {
        return Err(EngineError::AlreadyUsedVeto);
    }

    // Both flags commit together or not at all. Dropping the transaction
    // rolls back the option veto.
    tx.veto_option(option.id, participant_id).await?;
    if !tx.mark_participant_vetoed(participant_id).await? {
        return Err(EngineError::AlreadyUsedVeto);
    }

    tx.commit().await?;

    info!(
        "participant {} vetoed option {} in room {}",
        participant_id, option.id, membership.room.code
    );

    Ok(())
}

pub async fn spin(
    store: &dyn Store,
    code: &str,
    participant_id: i64,
) -> Result<SpinOutcome, EngineError> {
    if !validate_room_code(code) {
        return Err(EngineError::InvalidRoomCode);
    }

    let mut tx = store.begin().await?;

    let membership = tx
        .lock_membership(code, participant_id)
        .await?
        .ok_or(EngineError::RoomNotFound)?;
    if !membership.participant.is_host {
        return Err(EngineError::NotHost);
    }
    if !membership.room.is_gathering() {
        return Err(EngineError::AlreadySpun);
    }

    let options = tx.list_active_options(membership.room.id).await?;
    if options.len() < MIN_OPTIONS_TO_SPIN {
        return Err(EngineError::InsufficientOptions);
    }

    let winner_index = OsRng.gen_range(0..options.len());
    let winning = &options[winner_index];

    tx.decide_room(membership.room.id, winning.id).await?;
    let participant_name = tx
        .find_participant(winning.participant_id)
        .await?
        .map(|p| p.name)
        .unwrap_or_else(|| "Unknown".to_string());

    tx.commit().await?;

    info!(
        "room {} decided: option {} won ({} of {})",
        membership.room.code,
        winning.id,
        winner_index + 1,
        options.len()
    );

    Ok(SpinOutcome {
        winner: Winner {
            id: winning.id,
            text: winning.text.clone(),
            participant_id: winning.participant_id,
            participant_name,
        },
        winner_index,
        total_options: options.len(),
        all_options: options,
    })
}

pub async fn recent_decisions(store: &dyn Store) -> Result<Vec<RecentDecision>, EngineError> {
    let mut tx = store.begin().await?;
    let decisions = tx.recent_decisions(RECENT_DECISIONS_LIMIT).await?;
    tx.commit().await?;
    Ok(decisions)
}
