use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};

use super::{Store, StoreError, StoreTx};
use crate::models::participant::{Membership, Participant};
use crate::models::room::{Category, RecentDecision, Room, RoomStatus};
use crate::models::room_option::RoomOption;
use crate::models::session::Session;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

/// Wraps a Postgres transaction. Dropping it uncommitted rolls back.
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::Finished)
    }
}

#[derive(FromRow)]
struct MembershipRow {
    room_id: i64,
    code: String,
    category: Category,
    status: RoomStatus,
    winner_option_id: Option<i64>,
    room_created_at: DateTime<Utc>,
    participant_id: i64,
    name: String,
    is_host: bool,
    has_vetoed: bool,
    participant_created_at: DateTime<Utc>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Membership {
            room: Room {
                id: row.room_id,
                code: row.code,
                category: row.category,
                status: row.status,
                winner_option_id: row.winner_option_id,
                created_at: row.room_created_at,
            },
            participant: Participant {
                id: row.participant_id,
                room_id: row.room_id,
                name: row.name,
                is_host: row.is_host,
                has_vetoed: row.has_vetoed,
                created_at: row.participant_created_at,
            },
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_room(
        &mut self,
        code: &str,
        category: Category,
    ) -> Result<Option<Room>, StoreError> {
        let room = sqlx::query_as::<_, Room>(
            r#"
            INSERT INTO rooms (code, category)
            VALUES ($1, $2)
            ON CONFLICT (code) DO NOTHING
            RETURNING id, code, category, status, winner_option_id, created_at
            "#,
        )
        .bind(code)
        .bind(category)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(room)
    }

    async fn find_room_by_code(&mut self, code: &str) -> Result<Option<Room>, StoreError> {
        let room = sqlx::query_as::<_, Room>(
            "SELECT id, code, category, status, winner_option_id, created_at FROM rooms WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(room)
    }

    async fn lock_membership(
        &mut self,
        code: &str,
        participant_id: i64,
    ) -> Result<Option<Membership>, StoreError> {
        // Row locks on the room and the participant serialize every mutation of
        // that room and re-read the participant after a wait.
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT r.id AS room_id, r.code, r.category, r.status, r.winner_option_id,
                   r.created_at AS room_created_at,
                   p.id AS participant_id, p.name, p.is_host, p.has_vetoed,
                   p.created_at AS participant_created_at
            FROM rooms r
            JOIN participants p ON p.room_id = r.id
            WHERE r.code = $1 AND p.id = $2
            FOR UPDATE OF r, p
            "#,
        )
        .bind(code)
        .bind(participant_id)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(row.map(Membership::from))
    }

    async fn insert_participant(
        &mut self,
        room_id: i64,
        name: &str,
        is_host: bool,
    ) -> Result<Option<Participant>, StoreError> {
        let participant = sqlx::query_as::<_, Participant>(
            r#"
            INSERT INTO participants (room_id, name, is_host)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, name) DO NOTHING
            RETURNING id, room_id, name, is_host, has_vetoed, created_at
            "#,
        )
        .bind(room_id)
        .bind(name)
        .bind(is_host)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(participant)
    }

    async fn find_participant(&mut self, id: i64) -> Result<Option<Participant>, StoreError> {
        let participant = sqlx::query_as::<_, Participant>(
            "SELECT id, room_id, name, is_host, has_vetoed, created_at FROM participants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(participant)
    }

    async fn list_participants(&mut self, room_id: i64) -> Result<Vec<Participant>, StoreError> {
        let participants = sqlx::query_as::<_, Participant>(
            r#"
            SELECT id, room_id, name, is_host, has_vetoed, created_at
            FROM participants
            WHERE room_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(self.conn()?)
        .await?;

        Ok(participants)
    }

    async fn mark_participant_vetoed(&mut self, participant_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE participants SET has_vetoed = TRUE WHERE id = $1 AND has_vetoed = FALSE",
        )
        .bind(participant_id)
        .execute(self.conn()?)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_options_by(
        &mut self,
        room_id: i64,
        participant_id: i64,
    ) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM options WHERE room_id = $1 AND participant_id = $2",
        )
        .bind(room_id)
        .bind(participant_id)
        .fetch_one(self.conn()?)
        .await?;

        Ok(count)
    }

    async fn insert_option(
        &mut self,
        room_id: i64,
        participant_id: i64,
        text: &str,
    ) -> Result<RoomOption, StoreError> {
        let option = sqlx::query_as::<_, RoomOption>(
            r#"
            INSERT INTO options (room_id, participant_id, text, is_vetoed, vetoed_by_id)
            VALUES ($1, $2, $3, FALSE, NULL)
            RETURNING id, room_id, participant_id, text, is_vetoed, vetoed_by_id, created_at
            "#,
        )
        .bind(room_id)
        .bind(participant_id)
        .bind(text)
        .fetch_one(self.conn()?)
        .await?;

        Ok(option)
    }

    async fn find_option(
        &mut self,
        room_id: i64,
        option_id: i64,
    ) -> Result<Option<RoomOption>, StoreError> {
        let option = sqlx::query_as::<_, RoomOption>(
            r#"
            SELECT id, room_id, participant_id, text, is_vetoed, vetoed_by_id, created_at
            FROM options
            WHERE id = $1 AND room_id = $2
            "#,
        )
        .bind(option_id)
        .bind(room_id)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(option)
    }

    async fn list_options(&mut self, room_id: i64) -> Result<Vec<RoomOption>, StoreError> {
        let options = sqlx::query_as::<_, RoomOption>(
            r#"
            SELECT id, room_id, participant_id, text, is_vetoed, vetoed_by_id, created_at
            FROM options
            WHERE room_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(self.conn()?)
        .await?;

        Ok(options)
    }

    async fn list_active_options(&mut self, room_id: i64) -> Result<Vec<RoomOption>, StoreError> {
        let options = sqlx::query_as::<_, RoomOption>(
            r#"
            SELECT id, room_id, participant_id, text, is_vetoed, vetoed_by_id, created_at
            FROM options
            WHERE room_id = $1 AND is_vetoed = FALSE
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(self.conn()?)
        .await?;

        Ok(options)
    }

    async fn veto_option(&mut self, option_id: i64, vetoed_by_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE options SET is_vetoed = TRUE, vetoed_by_id = $1 WHERE id = $2")
            .bind(vetoed_by_id)
            .bind(option_id)
            .execute(self.conn()?)
            .await?;

        Ok(())
    }

    async fn decide_room(
        &mut self,
        room_id: i64,
        winner_option_id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE rooms SET status = $1, winner_option_id = $2 WHERE id = $3")
            .bind(RoomStatus::Decided)
            .bind(winner_option_id)
            .bind(room_id)
            .execute(self.conn()?)
            .await?;

        Ok(())
    }

    async fn recent_decisions(&mut self, limit: i64) -> Result<Vec<RecentDecision>, StoreError> {
        let decisions = sqlx::query_as::<_, RecentDecision>(
            r#"
            SELECT
                r.id,
                r.code,
                r.category,
                r.created_at,
                o.text AS winner_text,
                p.name AS winner_participant,
                COUNT(DISTINCT part.id) AS participant_count
            FROM rooms r
            JOIN options o ON r.winner_option_id = o.id
            JOIN participants p ON o.participant_id = p.id
            JOIN participants part ON part.room_id = r.id
            WHERE r.status = $1
            GROUP BY r.id, o.id, p.id
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT $2
            "#,
        )
        .bind(RoomStatus::Decided)
        .bind(limit)
        .fetch_all(self.conn()?)
        .await?;

        Ok(decisions)
    }

    async fn insert_session(
        &mut self,
        token: &str,
        participant_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (token, participant_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token, participant_id, expires_at, created_at
            "#,
        )
        .bind(token)
        .bind(participant_id)
        .bind(expires_at)
        .fetch_one(self.conn()?)
        .await?;

        Ok(session)
    }

    async fn find_session(&mut self, token: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT token, participant_id, expires_at, created_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(session)
    }

    async fn delete_session(&mut self, token: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_rooms_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM rooms WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_sessions_expired_by(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit().await?;
        Ok(())
    }
}
