use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::rate_limit::RateLimitConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AppConfig {
    pub env: String,
    pub bind_addr: String,
    pub app_url: String,
    pub storage: StorageBackend,
    pub db_url: String,
    pub db_max_connections: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub db_acquire_timeout: Duration,
    pub sentry_dsn: Option<String>,
    pub log_level: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub room_retention: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cleanup_interval: Duration,
    pub rate_limit: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            app_url: "http://localhost:3000".to_string(),
            storage: StorageBackend::Postgres,
            db_url: "postgres://localhost/spin_decide".to_string(),
            db_max_connections: 10,
            db_acquire_timeout: Duration::from_secs(5),
            sentry_dsn: None,
            log_level: "info".to_string(),
            room_retention: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `path` and then `SPIN_*` environment variables, e.g.
    /// `SPIN_DB_URL` or `SPIN_RATE_LIMIT__SPIN__MAX_REQUESTS`.
    pub fn new_from_file_and_env(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("spin")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|cfg| cfg.try_deserialize::<Self>())
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(
                r#"
                env = "production"
                storage = "memory"
                room_retention = 7200

                [rate_limit]
                enabled = false

                [rate_limit.spin]
                max_requests = 2
                window = 30
                "#,
                FileFormat::Toml,
            ))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .unwrap();

        assert!(cfg.is_production());
        assert_eq!(cfg.storage, StorageBackend::Memory);
        assert_eq!(cfg.room_retention, Duration::from_secs(7200));
        assert_eq!(cfg.cleanup_interval, Duration::from_secs(3600));
        assert_eq!(cfg.db_max_connections, 10);
        assert!(!cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.spin.max_requests, 2);
        assert_eq!(cfg.rate_limit.spin.window, Duration::from_secs(30));
        assert_eq!(cfg.rate_limit.create_room.max_requests, 5);
    }

    #[test]
    fn default_is_development() {
        let cfg = AppConfig::default();
        assert!(!cfg.is_production());
        assert_eq!(cfg.room_retention, Duration::from_secs(86_400));
        assert!(cfg.sentry_dsn.is_none());
    }
}
