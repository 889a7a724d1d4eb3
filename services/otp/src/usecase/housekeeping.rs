use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use agri_core::clock::Clock;

use crate::config::OtpConfig;
use crate::domain::repository::{AttemptLog, ChallengeStore, RateLimitStore};
use crate::error::OtpServiceError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HousekeepingReport {
    pub expired_marked: u64,
    pub challenges_deleted: u64,
    pub attempts_deleted: u64,
    pub counters_evicted: u64,
}

/// Storage hygiene. Nothing on the request path depends on it having run.
pub struct HousekeepingUseCase<S, A, L>
where
    S: ChallengeStore,
    A: AttemptLog,
    L: RateLimitStore,
{
    pub challenges: S,
    pub attempts: A,
    pub rate_limits: L,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<OtpConfig>,
}

impl<S, A, L> HousekeepingUseCase<S, A, L>
where
    S: ChallengeStore,
    A: AttemptLog,
    L: RateLimitStore,
{
    pub async fn execute(&self) -> Result<HousekeepingReport, OtpServiceError> {
        let now = self.clock.now();
        let cutoff = now - self.config.retention();

        let expired_marked = self.challenges.expire_stale(now).await?;
        let attempts_deleted = self.attempts.purge_before(cutoff).await?;
        let challenges_deleted = self.challenges.purge_created_before(cutoff).await?;
        let counters_evicted = self.rate_limits.sweep(now).await?;

        let report = HousekeepingReport {
            expired_marked,
            challenges_deleted,
            attempts_deleted,
            counters_evicted,
        };
        if report != HousekeepingReport::default() {
            info!(
                expired_marked,
                challenges_deleted,
                attempts_deleted,
                counters_evicted,
                "otp housekeeping completed"
            );
        }
        Ok(report)
    }
}
