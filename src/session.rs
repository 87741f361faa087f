//! Opaque bearer tokens that identify a participant for 24 hours.
//!
//! Expiry is fixed at issuance; there is no renewal. A token that is present
//! but expired is treated exactly like an unknown token.

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::store::{Store, StoreError, StoreTx};

pub const SESSION_TOKEN_BYTES: usize = 32;
pub const SESSION_LIFETIME_HOURS: i64 = 24;

pub fn session_lifetime() -> Duration {
    Duration::hours(SESSION_LIFETIME_HOURS)
}

/// 256 random bits from the OS, lowercase hex encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_well_formed_token(token: &str) -> bool {
    token.len() == SESSION_TOKEN_BYTES * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Issues a session inside the caller's transaction so that it commits
/// together with the participant it belongs to.
pub async fn create_session(
    tx: &mut dyn StoreTx,
    participant_id: i64,
) -> Result<String, StoreError> {
    let token = generate_session_token();
    let expires_at = Utc::now() + session_lifetime();
    tx.insert_session(&token, participant_id, expires_at)
        .await?;
    Ok(token)
}

pub async fn verify_session(store: &dyn Store, token: &str) -> Result<Option<i64>, StoreError> {
    if !is_well_formed_token(token) {
        return Ok(None);
    }

    let mut tx = store.begin().await?;
    let session = tx.find_session(token).await?;
    tx.commit().await?;

    Ok(session
        .filter(|s| s.is_live_at(Utc::now()))
        .map(|s| s.participant_id))
}

pub async fn delete_session(store: &dyn Store, token: &str) -> Result<(), StoreError> {
    let mut tx = store.begin().await?;
    tx.delete_session(token).await?;
    tx.commit().await?;
    Ok(())
}
