//! Storage adapters selected at startup. Ports use `async fn` in traits, so
//! runtime choice is an enum rather than a trait object.

use chrono::{DateTime, Utc};

use agri_domain::purpose::Purpose;

use crate::domain::repository::{AttemptLog, ChallengeStore, RateLimitStore};
use crate::domain::types::{AttemptRecord, Challenge, Reservation, StatusCount, WindowRule};
use crate::error::OtpServiceError;
use crate::infra::cache::RedisRateLimitStore;
use crate::infra::db::DbOtpStore;
use crate::infra::memory::{MemoryOtpStore, MemoryRateLimitStore};

// ── Challenge store + attempt log ─────────────────────────────────────────────

#[derive(Clone)]
pub enum OtpStore {
    Memory(MemoryOtpStore),
    Db(DbOtpStore),
}

impl OtpStore {
    pub async fn is_ready(&self) -> bool {
        match self {
            Self::Memory(_) => true,
            Self::Db(store) => store.db.ping().await.is_ok(),
        }
    }
}

impl ChallengeStore for OtpStore {
    async fn replace_pending(&self, challenge: &Challenge) -> Result<u64, OtpServiceError> {
        match self {
            Self::Memory(s) => s.replace_pending(challenge).await,
            Self::Db(s) => s.replace_pending(challenge).await,
        }
    }

    async fn find_latest(
        &self,
        recipient: &str,
        purpose: Purpose,
    ) -> Result<Option<Challenge>, OtpServiceError> {
        match self {
            Self::Memory(s) => s.find_latest(recipient, purpose).await,
            Self::Db(s) => s.find_latest(recipient, purpose).await,
        }
    }

    async fn mark_delivery_failed(&self, challenge: &Challenge) -> Result<(), OtpServiceError> {
        match self {
            Self::Memory(s) => s.mark_delivery_failed(challenge).await,
            Self::Db(s) => s.mark_delivery_failed(challenge).await,
        }
    }

    async fn update_latest<F, T>(
        &self,
        recipient: &str,
        purpose: Purpose,
        f: F,
    ) -> Result<T, OtpServiceError>
    where
        F: FnOnce(Option<&mut Challenge>) -> T + Send,
        T: Send,
    {
        match self {
            Self::Memory(s) => s.update_latest(recipient, purpose, f).await,
            Self::Db(s) => s.update_latest(recipient, purpose, f).await,
        }
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        match self {
            Self::Memory(s) => s.expire_stale(now).await,
            Self::Db(s) => s.expire_stale(now).await,
        }
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        match self {
            Self::Memory(s) => s.purge_created_before(cutoff).await,
            Self::Db(s) => s.purge_created_before(cutoff).await,
        }
    }

    async fn status_counts_since(
        &self,
        since: DateTime<Utc>,
        recipient: Option<&str>,
    ) -> Result<Vec<StatusCount>, OtpServiceError> {
        match self {
            Self::Memory(s) => s.status_counts_since(since, recipient).await,
            Self::Db(s) => s.status_counts_since(since, recipient).await,
        }
    }
}

impl AttemptLog for OtpStore {
    async fn append(&self, record: &AttemptRecord) -> Result<(), OtpServiceError> {
        match self {
            Self::Memory(s) => s.append(record).await,
            Self::Db(s) => s.append(record).await,
        }
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        match self {
            Self::Memory(s) => s.purge_before(cutoff).await,
            Self::Db(s) => s.purge_before(cutoff).await,
        }
    }
}

// ── Rate-limit counters ───────────────────────────────────────────────────────

#[derive(Clone)]
pub enum RateLimitBackend {
    Memory(MemoryRateLimitStore),
    Redis(RedisRateLimitStore),
}

impl RateLimitBackend {
    pub async fn is_ready(&self) -> bool {
        match self {
            Self::Memory(_) => true,
            Self::Redis(store) => store.pool.get().await.is_ok(),
        }
    }
}

impl RateLimitStore for RateLimitBackend {
    async fn check_and_reserve(
        &self,
        block_key: &str,
        rules: &[WindowRule],
        now: DateTime<Utc>,
    ) -> Result<Reservation, OtpServiceError> {
        match self {
            Self::Memory(s) => s.check_and_reserve(block_key, rules, now).await,
            Self::Redis(s) => s.check_and_reserve(block_key, rules, now).await,
        }
    }

    async fn block(
        &self,
        block_key: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), OtpServiceError> {
        match self {
            Self::Memory(s) => s.block(block_key, until, now).await,
            Self::Redis(s) => s.block(block_key, until, now).await,
        }
    }

    async fn unblock(&self, block_key: &str) -> Result<(), OtpServiceError> {
        match self {
            Self::Memory(s) => s.unblock(block_key).await,
            Self::Redis(s) => s.unblock(block_key).await,
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        match self {
            Self::Memory(s) => s.sweep(now).await,
            Self::Redis(s) => s.sweep(now).await,
        }
    }
}
