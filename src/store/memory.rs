use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreError, StoreTx};
use crate::models::participant::{Membership, Participant};
use crate::models::room::{Category, RecentDecision, Room, RoomStatus};
use crate::models::room_option::RoomOption;
use crate::models::session::Session;

/// Process-local store used by tests and the `memory` storage backend.
///
/// A transaction holds the single lock for its whole lifetime and works on a
/// private copy of the state, which replaces the shared state on commit.
/// Transactions are therefore fully serialized.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn backdate_room(&self, code: &str, by: chrono::Duration) {
        let mut state = self.state.lock().await;
        for room in state.rooms.values_mut().filter(|r| r.code == code) {
            room.created_at -= by;
        }
    }
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    last_id: i64,
    rooms: BTreeMap<i64, Room>,
    participants: BTreeMap<i64, Participant>,
    options: BTreeMap<i64, RoomOption>,
    sessions: HashMap<String, Session>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            finished: false,
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    finished: bool,
}

impl MemoryTx {
    fn state(&mut self) -> Result<&mut MemoryState, StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        Ok(&mut self.staged)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_room(
        &mut self,
        code: &str,
        category: Category,
    ) -> Result<Option<Room>, StoreError> {
        let state = self.state()?;
        if state.rooms.values().any(|r| r.code == code) {
            return Ok(None);
        }

        let room = Room {
            id: state.next_id(),
            code: code.to_string(),
            category,
            status: RoomStatus::Gathering,
            winner_option_id: None,
            created_at: Utc::now(),
        };
        state.rooms.insert(room.id, room.clone());
        Ok(Some(room))
    }

    async fn find_room_by_code(&mut self, code: &str) -> Result<Option<Room>, StoreError> {
        let state = self.state()?;
        Ok(state.rooms.values().find(|r| r.code == code).cloned())
    }

    async fn lock_membership(
        &mut self,
        code: &str,
        participant_id: i64,
    ) -> Result<Option<Membership>, StoreError> {
        let state = self.state()?;
        let Some(room) = state.rooms.values().find(|r| r.code == code) else {
            return Ok(None);
        };

        Ok(state
            .participants
            .get(&participant_id)
            .filter(|p| p.room_id == room.id)
            .map(|participant| Membership {
                room: room.clone(),
                participant: participant.clone(),
            }))
    }

    async fn insert_participant(
        &mut self,
        room_id: i64,
        name: &str,
        is_host: bool,
    ) -> Result<Option<Participant>, StoreError> {
        let state = self.state()?;
        if state
            .participants
            .values()
            .any(|p| p.room_id == room_id && p.name == name)
        {
            return Ok(None);
        }

        let participant = Participant {
            id: state.next_id(),
            room_id,
            name: name.to_string(),
            is_host,
            has_vetoed: false,
            created_at: Utc::now(),
        };
        state
            .participants
            .insert(participant.id, participant.clone());
        Ok(Some(participant))
    }

    async fn find_participant(&mut self, id: i64) -> Result<Option<Participant>, StoreError> {
        Ok(self.state()?.participants.get(&id).cloned())
    }

    async fn list_participants(&mut self, room_id: i64) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .state()?
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn mark_participant_vetoed(&mut self, participant_id: i64) -> Result<bool, StoreError> {
        match self.state()?.participants.get_mut(&participant_id) {
            Some(participant) if !participant.has_vetoed => {
                participant.has_vetoed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_options_by(
        &mut self,
        room_id: i64,
        participant_id: i64,
    ) -> Result<i64, StoreError> {
        let count = self
            .state()?
            .options
            .values()
            .filter(|o| o.room_id == room_id && o.participant_id == participant_id)
            .count();
        Ok(count as i64)
    }

    async fn insert_option(
        &mut self,
        room_id: i64,
        participant_id: i64,
        text: &str,
    ) -> Result<RoomOption, StoreError> {
        let state = self.state()?;
        let option = RoomOption {
            id: state.next_id(),
            room_id,
            participant_id,
            text: text.to_string(),
            is_vetoed: false,
            vetoed_by_id: None,
            created_at: Utc::now(),
        };
        state.options.insert(option.id, option.clone());
        Ok(option)
    }

    async fn find_option(
        &mut self,
        room_id: i64,
        option_id: i64,
    ) -> Result<Option<RoomOption>, StoreError> {
        Ok(self
            .state()?
            .options
            .get(&option_id)
            .filter(|o| o.room_id == room_id)
            .cloned())
    }

    async fn list_options(&mut self, room_id: i64) -> Result<Vec<RoomOption>, StoreError> {
        Ok(self
            .state()?
            .options
            .values()
            .filter(|o| o.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn list_active_options(&mut self, room_id: i64) -> Result<Vec<RoomOption>, StoreError> {
        Ok(self
            .state()?
            .options
            .values()
            .filter(|o| o.room_id == room_id && !o.is_vetoed)
            .cloned()
            .collect())
    }

    async fn veto_option(&mut self, option_id: i64, vetoed_by_id: i64) -> Result<(), StoreError> {
        if let Some(option) = self.state()?.options.get_mut(&option_id) {
            option.is_vetoed = true;
            option.vetoed_by_id = Some(vetoed_by_id);
        }
        Ok(())
    }

    async fn decide_room(
        &mut self,
        room_id: i64,
        winner_option_id: i64,
    ) -> Result<(), StoreError> {
        if let Some(room) = self.state()?.rooms.get_mut(&room_id) {
            room.status = RoomStatus::Decided;
            room.winner_option_id = Some(winner_option_id);
        }
        Ok(())
    }

    async fn recent_decisions(&mut self, limit: i64) -> Result<Vec<RecentDecision>, StoreError> {
        let state = self.state()?;
        let mut decided: Vec<&Room> = state
            .rooms
            .values()
            .filter(|r| r.status == RoomStatus::Decided)
            .collect();
        decided.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let decisions = decided
            .into_iter()
            .filter_map(|room| {
                let winner = state.options.get(&room.winner_option_id?)?;
                let author = state.participants.get(&winner.participant_id)?;
                let participant_count = state
                    .participants
                    .values()
                    .filter(|p| p.room_id == room.id)
                    .count();
                Some(RecentDecision {
                    id: room.id,
                    code: room.code.clone(),
                    category: room.category,
                    created_at: room.created_at,
                    winner_text: winner.text.clone(),
                    winner_participant: author.name.clone(),
                    participant_count: participant_count as i64,
                })
            })
            .take(usize::try_from(limit).unwrap_or(0))
            .collect();

        Ok(decisions)
    }

    async fn insert_session(
        &mut self,
        token: &str,
        participant_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let session = Session {
            token: token.to_string(),
            participant_id,
            expires_at,
            created_at: Utc::now(),
        };
        self.state()?
            .sessions
            .insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn find_session(&mut self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.state()?.sessions.get(token).cloned())
    }

    async fn delete_session(&mut self, token: &str) -> Result<u64, StoreError> {
        Ok(u64::from(self.state()?.sessions.remove(token).is_some()))
    }

    async fn delete_rooms_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state()?;
        let doomed: HashSet<i64> = state
            .rooms
            .values()
            .filter(|r| r.created_at < cutoff)
            .map(|r| r.id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        state.rooms.retain(|id, _| !doomed.contains(id));
        let removed_participants: HashSet<i64> = state
            .participants
            .values()
            .filter(|p| doomed.contains(&p.room_id))
            .map(|p| p.id)
            .collect();
        state
            .participants
            .retain(|id, _| !removed_participants.contains(id));
        state.options.retain(|_, o| !doomed.contains(&o.room_id));
        state
            .sessions
            .retain(|_, s| !removed_participants.contains(&s.participant_id));

        Ok(doomed.len() as u64)
    }

    async fn delete_sessions_expired_by(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.state()?;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.is_live_at(now));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        *self.guard = std::mem::take(&mut self.staged);
        self.finished = true;
        Ok(())
    }
}
