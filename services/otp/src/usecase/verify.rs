use std::sync::Arc;

use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use tracing::{info, warn};
use uuid::Uuid;

use agri_core::clock::Clock;
use agri_domain::challenge::ChallengeStatus;
use agri_domain::id::ChallengeId;
use agri_domain::purpose::Purpose;
use agri_domain::recipient::Recipient;

use crate::domain::repository::{AttemptLog, ChallengeStore};
use crate::domain::types::{AttemptRecord, Challenge, RequestContext};
use crate::error::OtpServiceError;

pub struct VerifyOtpInput {
    pub recipient: Recipient,
    pub purpose: Purpose,
    pub code: String,
    pub context: RequestContext,
}

pub struct VerifyOtpUseCase<S, A>
where
    S: ChallengeStore,
    A: AttemptLog,
{
    pub challenges: S,
    pub attempts: A,
    pub clock: Arc<dyn Clock>,
}

impl<S, A> VerifyOtpUseCase<S, A>
where
    S: ChallengeStore,
    A: AttemptLog,
{
    /// Check `code` against the latest challenge for the pair. Every call is
    /// recorded in the attempt log, including calls with no challenge.
    pub async fn execute(&self, input: VerifyOtpInput) -> Result<Challenge, OtpServiceError> {
        let now = self.clock.now();
        let supplied = input.code.trim().to_owned();

        let (challenge_id, outcome) = self
            .challenges
            .update_latest(input.recipient.as_str(), input.purpose, |latest| {
                evaluate(latest, &supplied, now)
            })
            .await?;

        let record = AttemptRecord {
            id: Uuid::now_v7(),
            challenge_id,
            recipient: input.recipient.as_str().to_owned(),
            purpose: input.purpose,
            supplied_code: supplied,
            succeeded: outcome.is_ok(),
            failure_reason: outcome.as_ref().err().map(OtpServiceError::audit_reason),
            ip_address: input.context.ip,
            attempted_at: now,
        };
        self.attempts.append(&record).await?;

        match &outcome {
            Ok(challenge) => info!(
                challenge_id = %challenge.id,
                recipient = %input.recipient.masked(),
                purpose = %input.purpose,
                "otp verified"
            ),
            Err(e) => warn!(
                challenge_id = ?challenge_id.map(|id| id.to_string()),
                recipient = %input.recipient.masked(),
                purpose = %input.purpose,
                kind = e.kind(),
                "otp verification rejected"
            ),
        }
        outcome
    }
}

/// Apply one verification attempt to the latest challenge, mutating it in place.
fn evaluate(
    latest: Option<&mut Challenge>,
    supplied: &str,
    now: DateTime<Utc>,
) -> (Option<ChallengeId>, Result<Challenge, OtpServiceError>) {
    let Some(challenge) = latest else {
        return (None, Err(OtpServiceError::NotFound));
    };
    let id = Some(challenge.id);

    let outcome = match challenge.status {
        ChallengeStatus::Pending => {
            if challenge.is_expired_at(now) {
                challenge.status = ChallengeStatus::Expired;
                Err(OtpServiceError::Expired)
            } else if challenge.attempts_used >= challenge.max_attempts {
                challenge.status = ChallengeStatus::Failed;
                Err(OtpServiceError::AttemptsExceeded)
            } else if constant_time_eq(supplied.as_bytes(), challenge.code.as_bytes()) {
                challenge.status = ChallengeStatus::Verified;
                challenge.verified_at = Some(now);
                Ok(challenge.clone())
            } else {
                challenge.attempts_used += 1;
                if challenge.attempts_used >= challenge.max_attempts {
                    challenge.status = ChallengeStatus::Failed;
                    Err(OtpServiceError::AttemptsExceeded)
                } else {
                    Err(OtpServiceError::Mismatch {
                        attempts_remaining: challenge.attempts_remaining(),
                    })
                }
            }
        }
        ChallengeStatus::Expired => Err(OtpServiceError::Expired),
        // Exhausted budget, as opposed to a failed delivery.
        ChallengeStatus::Failed if challenge.attempts_used >= challenge.max_attempts => {
            Err(OtpServiceError::AttemptsExceeded)
        }
        status => Err(OtpServiceError::AlreadyResolved { status }),
    };
    (id, outcome)
}
