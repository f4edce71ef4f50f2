//! The auth-token gate: the single entry point that decides whether a call
//! is admitted and records usage for admitted calls.
//!
//! Concurrency contract: the whole check → execute → record sequence for one
//! call runs inside `lock()`, so calls within a process are fully ordered.
//! The lock does not cover other processes; there the store's atomic
//! increment is the only safety net and `call_count` may overshoot the limit
//! by the in-flight units of concurrently admitted calls (soft limit).

use tokio::sync::{Mutex, MutexGuard, OnceCell};

use crate::cache::UsageCache;
use crate::errors::AppError;
use crate::store::SqliteStore;

/// Admin token seeded into the store the first time the gate runs.
#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub token: String,
    pub description: String,
}

pub struct AuthGate {
    store: SqliteStore,
    cache: UsageCache,
    admission: Mutex<()>,
    bootstrap: OnceCell<()>,
    seed_admin: Option<SeedAdmin>,
}

impl AuthGate {
    pub fn new(store: SqliteStore, seed_admin: Option<SeedAdmin>) -> Self {
        Self {
            store,
            cache: UsageCache::new(),
            admission: Mutex::new(()),
            bootstrap: OnceCell::new(),
            seed_admin,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// The process-wide single-admission section. Held by the caller for the
    /// full lifetime of one gated call.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.admission.lock().await
    }

    /// One-time seeding of default tokens, run lazily on the first check.
    async fn ensure_bootstrap(&self) -> Result<(), AppError> {
        self.bootstrap
            .get_or_try_init(|| async {
                if let Some(seed) = &self.seed_admin {
                    self.store
                        .upsert_admin_token(&seed.token, &seed.description)
                        .await?;
                    tracing::info!("gate: seeded bootstrap admin token");
                }
                Ok::<_, anyhow::Error>(())
            })
            .await?;
        Ok(())
    }

    /// Is the token known and under its limit? Refreshing the usage cache
    /// from the store (or evicting the entry when the token is unknown) is a
    /// mandatory side effect of every check, not an optimization.
    pub async fn check_and_refresh(&self, token: &str) -> Result<bool, AppError> {
        self.ensure_bootstrap().await?;

        let row = self.store.get_token_row(token).await?;

        let Some(row) = row else {
            self.cache.invalidate(token);
            return Ok(false);
        };

        // Token valid but count never assigned: persist 0 before judging it.
        if row.call_count.is_none() {
            self.store.init_call_count(token).await?;
        }
        let count = row.call_count.unwrap_or(0);

        self.cache
            .refresh(token, count, row.call_count_limit, row.description.as_deref());

        // Strict comparison: a token whose count has reached its limit is
        // exhausted, even though the call that got it there was admitted.
        Ok(row.call_count_limit.map_or(true, |limit| count < limit))
    }

    /// Record `units` of use against the token, and against the endpoint
    /// breakdown when given. Store first, cache second; a store failure
    /// propagates and must never be masked by the (infallible) cache side.
    pub async fn record_usage(
        &self,
        token: &str,
        units: i64,
        endpoint: Option<&str>,
    ) -> Result<(), AppError> {
        self.store.increment_call_count(token, units, endpoint).await?;
        self.cache.bump(token, units);
        Ok(())
    }

    /// Admin tokens are a separate namespace with no count/limit semantics.
    pub async fn is_admin_valid(&self, token: &str) -> Result<bool, AppError> {
        self.ensure_bootstrap().await?;
        Ok(self.store.admin_token_exists(token).await?)
    }

    pub fn cached_counts(&self, token: &str) -> Option<(i64, Option<i64>)> {
        self.cache.get(token)
    }

    pub fn cached_description(&self, token: &str) -> Option<String> {
        self.cache.get_description(token)
    }

    /// Remaining call allowance as reported to clients: -1 when unlimited,
    /// clamped at 0 when exhausted, 0 when the token is not in the cache.
    pub fn remaining(&self, token: &str) -> i64 {
        match self.cache.get(token) {
            Some((_, None)) => -1,
            Some((count, Some(limit))) => (limit - count).max(0),
            None => 0,
        }
    }
}
