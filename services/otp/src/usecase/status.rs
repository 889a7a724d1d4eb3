use std::sync::Arc;

use chrono::{DateTime, Utc};

use agri_core::clock::Clock;
use agri_domain::challenge::ChallengeStatus;
use agri_domain::id::ChallengeId;
use agri_domain::purpose::Purpose;
use agri_domain::recipient::Recipient;

use crate::domain::repository::ChallengeStore;
use crate::error::OtpServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct OtpStatus {
    pub challenge_id: ChallengeId,
    /// Stored status with lazy expiry applied.
    pub status: ChallengeStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: u32,
}

/// Read-only view of the latest challenge for a pair.
pub struct OtpStatusUseCase<S>
where
    S: ChallengeStore,
{
    pub challenges: S,
    pub clock: Arc<dyn Clock>,
}

impl<S> OtpStatusUseCase<S>
where
    S: ChallengeStore,
{
    pub async fn execute(
        &self,
        recipient: &Recipient,
        purpose: Purpose,
    ) -> Result<OtpStatus, OtpServiceError> {
        let challenge = self
            .challenges
            .find_latest(recipient.as_str(), purpose)
            .await?
            .ok_or(OtpServiceError::NotFound)?;
        let now = self.clock.now();
        Ok(OtpStatus {
            challenge_id: challenge.id,
            status: challenge.effective_status(now),
            created_at: challenge.created_at,
            expires_at: challenge.expires_at,
            attempts_remaining: challenge.attempts_remaining(),
        })
    }
}
