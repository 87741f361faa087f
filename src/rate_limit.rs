//! Per-client sliding-window request limits.
//!
//! Each action kind has its own `{max_requests, window}` rule and its own
//! counters, keyed by `(kind, identifier)`. Counters live in process memory
//! and are swept periodically.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitKind {
    CreateRoom,
    JoinRoom,
    SubmitOption,
    Veto,
    Spin,
}

impl RateLimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitKind::CreateRoom => "create_room",
            RateLimitKind::JoinRoom => "join_room",
            RateLimitKind::SubmitOption => "submit_option",
            RateLimitKind::Veto => "veto",
            RateLimitKind::Spin => "spin",
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: usize,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn per_minute(max_requests: usize) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sweep_interval: Duration,
    pub create_room: RateLimitRule,
    pub join_room: RateLimitRule,
    pub submit_option: RateLimitRule,
    pub veto: RateLimitRule,
    pub spin: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval: Duration::from_secs(5 * 60),
            create_room: RateLimitRule::per_minute(5),
            join_room: RateLimitRule::per_minute(10),
            submit_option: RateLimitRule::per_minute(20),
            veto: RateLimitRule::per_minute(10),
            spin: RateLimitRule::per_minute(5),
        }
    }
}

impl RateLimitConfig {
    pub fn rule(&self, kind: RateLimitKind) -> RateLimitRule {
        match kind {
            RateLimitKind::CreateRoom => self.create_room,
            RateLimitKind::JoinRoom => self.join_room,
            RateLimitKind::SubmitOption => self.submit_option,
            RateLimitKind::Veto => self.veto,
            RateLimitKind::Spin => self.spin,
        }
    }
}

type RecordKey = (RateLimitKind, String);

pub struct RateLimiter {
    config: RateLimitConfig,
    records: DashMap<RecordKey, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns `true` when the request is allowed and records it.
    pub fn check(&self, kind: RateLimitKind, identifier: &str) -> bool {
        self.check_at(kind, identifier, Instant::now())
    }

    pub fn check_at(&self, kind: RateLimitKind, identifier: &str, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let rule = self.config.rule(kind);
        let mut timestamps = self
            .records
            .entry((kind, identifier.to_string()))
            .or_default();

        discard_older_than(&mut timestamps, now, rule.window);

        if timestamps.len() >= rule.max_requests {
            debug!(
                "rate limited {} for {} ({} in {:?})",
                kind.as_str(),
                identifier,
                timestamps.len(),
                rule.window
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Drops expired timestamps and forgets identifiers with none left.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|(kind, _), timestamps| {
            discard_older_than(timestamps, now, self.config.rule(*kind).window);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.records.len())
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = self.sweep_at(Instant::now());
                debug!(
                    "rate limiter sweep removed {} records, {} remain",
                    removed,
                    self.tracked()
                );
            }
        })
    }
}

fn discard_older_than(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// Identifier used for requests without a forwarded client address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// First entry of an `X-Forwarded-For` value, if any.
pub fn client_identifier(forwarded_for: Option<&str>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
