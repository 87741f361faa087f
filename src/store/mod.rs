//! Transactional storage behind the decision engine.
//!
//! Every engine operation opens one [`StoreTx`], performs its reads and
//! writes through it and finally calls [`StoreTx::commit`]. Dropping a
//! transaction without committing discards all of its writes.
//!
//! Implementations must make the membership lookup in
//! [`StoreTx::lock_membership`] exclusive per room for the rest of the
//! transaction, so that count-then-insert and read-then-decide sequences
//! cannot interleave with another mutation of the same room.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::participant::{Membership, Participant};
use crate::models::room::{Category, RecentDecision, Room};
use crate::models::room_option::RoomOption;
use crate::models::session::Session;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("transaction already finished")]
    Finished,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Inserts a gathering room. Returns `None` when the code is taken.
    async fn insert_room(
        &mut self,
        code: &str,
        category: Category,
    ) -> Result<Option<Room>, StoreError>;

    async fn find_room_by_code(&mut self, code: &str) -> Result<Option<Room>, StoreError>;

    /// Looks up `participant_id` inside the room with `code` and locks that
    /// room until the transaction ends.
    async fn lock_membership(
        &mut self,
        code: &str,
        participant_id: i64,
    ) -> Result<Option<Membership>, StoreError>;

    /// Returns `None` when the name is already used in the room.
    async fn insert_participant(
        &mut self,
        room_id: i64,
        name: &str,
        is_host: bool,
    ) -> Result<Option<Participant>, StoreError>;

    async fn find_participant(&mut self, id: i64) -> Result<Option<Participant>, StoreError>;

    async fn list_participants(&mut self, room_id: i64) -> Result<Vec<Participant>, StoreError>;

    /// Returns `false` when the participant had already used their veto.
    async fn mark_participant_vetoed(&mut self, participant_id: i64) -> Result<bool, StoreError>;

    async fn count_options_by(
        &mut self,
        room_id: i64,
        participant_id: i64,
    ) -> Result<i64, StoreError>;

    async fn insert_option(
        &mut self,
        room_id: i64,
        participant_id: i64,
        text: &str,
    ) -> Result<RoomOption, StoreError>;

    async fn find_option(
        &mut self,
        room_id: i64,
        option_id: i64,
    ) -> Result<Option<RoomOption>, StoreError>;

    /// All options of the room in creation order.
    async fn list_options(&mut self, room_id: i64) -> Result<Vec<RoomOption>, StoreError>;

    /// Non-vetoed options of the room in creation order.
    async fn list_active_options(&mut self, room_id: i64) -> Result<Vec<RoomOption>, StoreError>;

    async fn veto_option(&mut self, option_id: i64, vetoed_by_id: i64) -> Result<(), StoreError>;

    async fn decide_room(&mut self, room_id: i64, winner_option_id: i64)
        -> Result<(), StoreError>;

    async fn recent_decisions(&mut self, limit: i64) -> Result<Vec<RecentDecision>, StoreError>;

    async fn insert_session(
        &mut self,
        token: &str,
        participant_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, StoreError>;

    async fn find_session(&mut self, token: &str) -> Result<Option<Session>, StoreError>;

    async fn delete_session(&mut self, token: &str) -> Result<u64, StoreError>;

    /// Removes rooms created before `cutoff` together with everything they own.
    async fn delete_rooms_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn delete_sessions_expired_by(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}
