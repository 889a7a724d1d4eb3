use std::sync::Arc;

use tracing::{info, warn};

use agri_core::clock::Clock;
use agri_domain::challenge::ChallengeStatus;
use agri_domain::id::ChallengeId;
use agri_domain::purpose::Purpose;
use agri_domain::recipient::Recipient;

use crate::config::OtpConfig;
use crate::domain::repository::{ChallengeStore, DeliveryChannel, RateLimitStore};
use crate::domain::types::{Challenge, OtpMessage, RequestContext};
use crate::error::OtpServiceError;
use crate::usecase::codegen::generate_code;
use crate::usecase::rate_limit::RateLimiter;

pub struct RequestOtpInput {
    pub recipient: Recipient,
    pub purpose: Purpose,
    pub context: RequestContext,
}

pub struct RequestOtpUseCase<S, L, D>
where
    S: ChallengeStore,
    L: RateLimitStore,
    D: DeliveryChannel,
{
    pub challenges: S,
    pub rate_limiter: RateLimiter<L>,
    pub channel: D,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<OtpConfig>,
}

impl<S, L, D> RequestOtpUseCase<S, L, D>
where
    S: ChallengeStore,
    L: RateLimitStore,
    D: DeliveryChannel,
{
    pub async fn execute(&self, input: RequestOtpInput) -> Result<Challenge, OtpServiceError> {
        let RequestOtpInput {
            recipient,
            purpose,
            context,
        } = input;
        let now = self.clock.now();

        // 1. Reserve quota. Not refunded if delivery fails below.
        self.rate_limiter
            .check_and_reserve(recipient.as_str(), purpose, context.ip.as_deref(), now)
            .await?;

        // 2. Expire the previous pending challenge and persist the new one atomically
        let challenge = Challenge {
            id: ChallengeId::generate(),
            recipient: recipient.as_str().to_owned(),
            purpose,
            code: generate_code(self.config.code_length, self.config.code_alphabet),
            status: ChallengeStatus::Pending,
            attempts_used: 0,
            max_attempts: self.config.max_attempts,
            user_id: context.user_id,
            ip_address: context.ip,
            user_agent: context.user_agent,
            created_at: now,
            expires_at: now + self.config.ttl(),
            verified_at: None,
        };
        let superseded = self.challenges.replace_pending(&challenge).await?;

        // 3. Deliver within the configured deadline
        let message = OtpMessage {
            recipient: recipient.clone(),
            purpose,
            code: challenge.code.clone(),
            expires_at: challenge.expires_at,
            ttl_minutes: self.config.ttl_minutes,
        };
        let delivery =
            tokio::time::timeout(self.config.delivery_timeout(), self.channel.send(&message)).await;
        let failure = match delivery {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.0),
            Err(_) => Some("delivery timed out".to_owned()),
        };
        if let Some(cause) = failure {
            self.challenges.mark_delivery_failed(&challenge).await?;
            warn!(
                challenge_id = %challenge.id,
                recipient = %recipient.masked(),
                %purpose,
                cause = %cause,
                "otp delivery failed"
            );
            return Err(OtpServiceError::DeliveryFailed { cause });
        }

        info!(
            challenge_id = %challenge.id,
            recipient = %recipient.masked(),
            %purpose,
            superseded,
            "otp issued"
        );
        Ok(challenge)
    }
}

/// `RequestOtpUseCase` behind a per-pair cooldown.
pub struct ResendOtpUseCase<S, L, D>
where
    S: ChallengeStore,
    L: RateLimitStore,
    D: DeliveryChannel,
{
    pub request: RequestOtpUseCase<S, L, D>,
}

impl<S, L, D> ResendOtpUseCase<S, L, D>
where
    S: ChallengeStore,
    L: RateLimitStore,
    D: DeliveryChannel,
{
    pub async fn execute(&self, input: RequestOtpInput) -> Result<Challenge, OtpServiceError> {
        let now = self.request.clock.now();
        let latest = self
            .request
            .challenges
            .find_latest(input.recipient.as_str(), input.purpose)
            .await?;

        if let Some(latest) = latest {
            let ready_at = latest.created_at + self.request.config.resend_cooldown();
            if now < ready_at {
                let remaining_ms = (ready_at - now).num_milliseconds();
                let seconds_remaining = (remaining_ms + 999) / 1000;
                info!(
                    recipient = %input.recipient.masked(),
                    purpose = %input.purpose,
                    seconds_remaining,
                    "otp resend refused during cooldown"
                );
                return Err(OtpServiceError::CooldownActive { seconds_remaining });
            }
        }

        self.request.execute(input).await
    }
}
