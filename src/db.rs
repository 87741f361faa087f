use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Error, PgPool};
use tracing::{info, warn};

use crate::config::StorageBackend;
use crate::store::{MemoryStore, PgStore, Store};
use crate::AppConfig;

impl AppConfig {
    pub async fn connect_database(&self) -> Result<PgPool, Error> {
        let db = PgPoolOptions::new()
            .max_connections(self.db_max_connections)
            .acquire_timeout(self.db_acquire_timeout)
            .connect(&self.db_url)
            .await?;
        Ok(db)
    }

    /// Opens the configured storage backend. Postgres is migrated before use.
    pub async fn connect_store(&self) -> anyhow::Result<Arc<dyn Store>> {
        match self.storage {
            StorageBackend::Postgres => {
                let store = PgStore::new(self.connect_database().await?);
                store.migrate().await?;
                info!("connected to postgres, migrations applied");
                Ok(Arc::new(store))
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    warn!("using in-memory storage in production, rooms are lost on restart");
                }
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}
