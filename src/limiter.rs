//! Fixed-window rate limiter keyed by client identity

use crate::store::{EntryStore, MemoryStore};
use crate::utils::config::RateLimitSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One client's counter for the current window
#[derive(Debug, Clone)]
pub struct RateWindow {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub limit: u32,
}

pub struct RateLimiter {
    store: Arc<dyn EntryStore<RateWindow>>,
    default_limit: u32,
    default_window: Duration,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), settings)
    }

    pub fn with_store(
        store: Arc<dyn EntryStore<RateWindow>>,
        settings: &RateLimitSettings,
    ) -> Self {
        Self {
            store,
            default_limit: settings.limit.max(1),
            default_window: settings.window,
        }
    }

    /// Count one request from `client` and decide whether it may proceed
    ///
    /// A request past the limit is still counted, so a client hammering the
    /// limiter does not earn extra slots.
    pub async fn check(&self, client: &str, limit: u32, window: Duration) -> RateDecision {
        let now = Utc::now();
        let window_len =
            chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::weeks(52));

        let current = self
            .store
            .update(
                client,
                Box::new(move |existing: Option<RateWindow>| match existing {
                    Some(w) if now < w.reset_at => RateWindow {
                        count: w.count.saturating_add(1),
                        reset_at: w.reset_at,
                    },
                    _ => RateWindow {
                        count: 1,
                        reset_at: now + window_len,
                    },
                }),
            )
            .await;

        let allowed = current.count <= limit;
        if !allowed {
            debug!(client = %client, "Rate limit exceeded ({}/{})", current.count, limit);
        }

        RateDecision {
            allowed,
            remaining: limit.saturating_sub(current.count),
            reset_at: current.reset_at,
            limit,
        }
    }

    pub async fn check_default(&self, client: &str) -> RateDecision {
        self.check(client, self.default_limit, self.default_window).await
    }

    /// Remove windows that have elapsed; returns how many were dropped
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        self.store
            .sweep(&move |w: &RateWindow| now >= w.reset_at)
            .await
            .len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.store.len().await
    }
}
