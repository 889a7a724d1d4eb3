#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use agri_domain::purpose::Purpose;

use crate::domain::types::{
    AttemptRecord, Challenge, OtpMessage, Reservation, StatusCount, WindowRule,
};
use crate::error::OtpServiceError;

/// Durable storage for challenges. Every mutation of a `(recipient, purpose)`
/// pair is serialized per pair; different pairs never wait on each other.
pub trait ChallengeStore: Send + Sync {
    /// Expire any pending challenge for the pair and insert `challenge`, as one
    /// atomic step. Returns how many pending challenges were expired.
    async fn replace_pending(&self, challenge: &Challenge) -> Result<u64, OtpServiceError>;

    /// Most recently created challenge for the pair, regardless of status.
    async fn find_latest(
        &self,
        recipient: &str,
        purpose: Purpose,
    ) -> Result<Option<Challenge>, OtpServiceError>;

    /// Move `challenge` to `failed` if it is still pending.
    async fn mark_delivery_failed(&self, challenge: &Challenge) -> Result<(), OtpServiceError>;

    /// Run `f` against the latest challenge for the pair while holding the
    /// pair's lock. Changes made by `f` are persisted before the lock is released.
    async fn update_latest<F, T>(
        &self,
        recipient: &str,
        purpose: Purpose,
        f: F,
    ) -> Result<T, OtpServiceError>
    where
        F: FnOnce(Option<&mut Challenge>) -> T + Send,
        T: Send;

    /// Mark pending challenges past their deadline as expired.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError>;

    /// Delete challenges created before `cutoff`.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError>;

    /// Challenge counts grouped by purpose and status, for challenges created
    /// at or after `since`, optionally for one recipient only.
    async fn status_counts_since(
        &self,
        since: DateTime<Utc>,
        recipient: Option<&str>,
    ) -> Result<Vec<StatusCount>, OtpServiceError>;
}

/// Append-only verification audit log.
pub trait AttemptLog: Send + Sync {
    async fn append(&self, record: &AttemptRecord) -> Result<(), OtpServiceError>;

    /// Delete records older than `cutoff`.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError>;
}

/// Shared counter store behind the rate limiter.
pub trait RateLimitStore: Send + Sync {
    /// Check the block key and every rule, then increment all rule counters,
    /// as one atomic unit. Nothing is incremented unless the result is `Granted`.
    async fn check_and_reserve(
        &self,
        block_key: &str,
        rules: &[WindowRule],
        now: DateTime<Utc>,
    ) -> Result<Reservation, OtpServiceError>;

    async fn block(
        &self,
        block_key: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), OtpServiceError>;

    async fn unblock(&self, block_key: &str) -> Result<(), OtpServiceError>;

    /// Drop counters with no open window and no active block. Returns how
    /// many were dropped.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError>;
}

/// Failure reported by a delivery channel.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Outbound transport for a rendered code (email gateway, SMS gateway, ...).
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, message: &OtpMessage) -> Result<(), DeliveryError>;
}
