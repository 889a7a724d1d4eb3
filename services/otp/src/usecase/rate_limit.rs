use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use agri_domain::purpose::Purpose;
use agri_domain::recipient::mask;

use crate::config::OtpConfig;
use crate::domain::repository::RateLimitStore;
use crate::domain::types::{Reservation, WindowRule};
use crate::error::OtpServiceError;

pub const BLOCKED_REASON: &str = "blocked";

fn block_key(recipient: &str, purpose: Purpose) -> String {
    format!("otp:rl:block:{purpose}:{recipient}")
}

/// Per-recipient, per-IP and global send ceilings plus explicit blocks.
pub struct RateLimiter<L>
where
    L: RateLimitStore,
{
    pub store: L,
    pub config: Arc<OtpConfig>,
}

impl<L> RateLimiter<L>
where
    L: RateLimitStore,
{
    pub fn rules(&self, recipient: &str, purpose: Purpose, ip: Option<&str>) -> Vec<WindowRule> {
        let limits = &self.config.rate_limits;
        let mut rules = vec![
            WindowRule {
                key: format!("otp:rl:recipient:{purpose}:{recipient}:hour"),
                window: Duration::hours(1),
                limit: limits.per_recipient_hourly,
                reason: "hourly limit for recipient exceeded",
            },
            WindowRule {
                key: format!("otp:rl:recipient:{purpose}:{recipient}:day"),
                window: Duration::days(1),
                limit: limits.per_recipient_daily,
                reason: "daily limit for recipient exceeded",
            },
        ];
        if let Some(ip) = ip {
            rules.push(WindowRule {
                key: format!("otp:rl:ip:{ip}:hour"),
                window: Duration::hours(1),
                limit: limits.per_ip_hourly,
                reason: "hourly limit for ip address exceeded",
            });
        }
        rules.push(WindowRule {
            key: "otp:rl:global:minute".to_owned(),
            window: Duration::minutes(1),
            limit: limits.global_per_minute,
            reason: "global rate limit exceeded",
        });
        rules
    }

    /// Reserve one send for the recipient. Counters are not refunded if the
    /// send later fails.
    pub async fn check_and_reserve(
        &self,
        recipient: &str,
        purpose: Purpose,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), OtpServiceError> {
        let rules = self.rules(recipient, purpose, ip);
        let reservation = self
            .store
            .check_and_reserve(&block_key(recipient, purpose), &rules, now)
            .await?;
        match reservation {
            Reservation::Granted => Ok(()),
            Reservation::Blocked { until } => {
                warn!(recipient = %mask(recipient), %purpose, %until, "otp request from blocked recipient");
                Err(OtpServiceError::RateLimited {
                    reason: BLOCKED_REASON.to_owned(),
                })
            }
            Reservation::Exceeded { reason } => {
                warn!(recipient = %mask(recipient), %purpose, reason, "otp rate limit hit");
                Err(OtpServiceError::RateLimited {
                    reason: reason.to_owned(),
                })
            }
        }
    }

    pub async fn block(
        &self,
        recipient: &str,
        purpose: Purpose,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, OtpServiceError> {
        let until = now + duration;
        self.store
            .block(&block_key(recipient, purpose), until, now)
            .await?;
        info!(recipient = %mask(recipient), %purpose, %until, "recipient blocked");
        Ok(until)
    }

    pub async fn unblock(&self, recipient: &str, purpose: Purpose) -> Result<(), OtpServiceError> {
        self.store.unblock(&block_key(recipient, purpose)).await?;
        info!(recipient = %mask(recipient), %purpose, "recipient unblocked");
        Ok(())
    }
}
