//! Retention of rooms and expiry of sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub rooms_deleted: u64,
    pub sessions_deleted: u64,
}

/// Deletes rooms created more than `retention` ago (with their participants,
/// options and sessions) and every session that has expired.
pub async fn run_once(
    store: &dyn Store,
    retention: chrono::Duration,
) -> Result<CleanupReport, StoreError> {
    let now = Utc::now();

    let mut tx = store.begin().await?;
    let rooms_deleted = tx.delete_rooms_created_before(now - retention).await?;
    let sessions_deleted = tx.delete_sessions_expired_by(now).await?;
    tx.commit().await?;

    Ok(CleanupReport {
        rooms_deleted,
        sessions_deleted,
    })
}

pub fn spawn_periodic(
    store: Arc<dyn Store>,
    retention: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let retention = match chrono::Duration::from_std(retention) {
            Ok(retention) => retention,
            Err(e) => {
                error!("invalid room retention {:?}: {}", retention, e);
                return;
            }
        };

        info!(
            "Starting room cleanup task (interval: {:?}, retention: {})",
            interval, retention
        );

        loop {
            tokio::time::sleep(interval).await;

            let start_time = Instant::now();
            match run_once(store.as_ref(), retention).await {
                Ok(report) => {
                    if report.rooms_deleted > 0 || report.sessions_deleted > 0 {
                        info!(
                            "Deleted {} old room(s) and {} expired session(s)",
                            report.rooms_deleted, report.sessions_deleted
                        );
                    }
                    debug!("Cleanup cycle completed in {:?}", start_time.elapsed());
                }
                Err(e) => error!("Cleanup cycle failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{create_room, get_room_state, EngineError};
    use crate::session::verify_session;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn removes_rooms_past_retention_only() {
        let store = MemoryStore::new();
        let old = create_room(&store, "eat", "Al").await.unwrap();
        let fresh = create_room(&store, "do", "Bea").await.unwrap();
        store
            .backdate_room(&old.code, chrono::Duration::hours(25))
            .await;

        let report = run_once(&store, chrono::Duration::hours(24)).await.unwrap();
        assert_eq!(report.rooms_deleted, 1);

        assert!(matches!(
            get_room_state(&store, &old.code).await,
            Err(EngineError::RoomNotFound)
        ));
        assert_eq!(
            verify_session(&store, &old.session_token).await.unwrap(),
            None
        );

        get_room_state(&store, &fresh.code).await.unwrap();
        assert_eq!(
            verify_session(&store, &fresh.session_token).await.unwrap(),
            Some(fresh.participant_id)
        );
    }

    #[tokio::test]
    async fn removes_expired_sessions() {
        let store = MemoryStore::new();
        let created = create_room(&store, "watch", "Al").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_session(
            &"0".repeat(64),
            created.participant_id,
            Utc::now() - chrono::Duration::minutes(1),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let report = run_once(&store, chrono::Duration::hours(24)).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                rooms_deleted: 0,
                sessions_deleted: 1
            }
        );
        assert_eq!(
            verify_session(&store, &created.session_token).await.unwrap(),
            Some(created.participant_id)
        );
    }
}
