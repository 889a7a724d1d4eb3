use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use agri_domain::challenge::ChallengeStatus;
use agri_domain::id::{ChallengeId, UserId};
use agri_domain::purpose::Purpose;
use agri_domain::recipient::Recipient;

/// One issued OTP, scoped to a normalized recipient and a purpose.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub id: ChallengeId,
    /// Normalized email address or E.164 phone number.
    pub recipient: String,
    pub purpose: Purpose,
    pub code: String,
    pub status: ChallengeStatus,
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub user_id: Option<UserId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Challenge {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_used)
    }

    /// Stored status with lazy expiry applied: a pending challenge past its
    /// deadline reads as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ChallengeStatus {
        if self.status == ChallengeStatus::Pending && self.is_expired_at(now) {
            ChallengeStatus::Expired
        } else {
            self.status
        }
    }
}

/// Append-only audit row for a single verification call.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub id: Uuid,
    /// `None` when no challenge existed for the pair.
    pub challenge_id: Option<ChallengeId>,
    pub recipient: String,
    pub purpose: Purpose,
    pub supplied_code: String,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Caller metadata attached to issue and verify calls.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<UserId>,
}

/// Everything a delivery channel needs to render and send a code.
#[derive(Debug, Clone)]
pub struct OtpMessage {
    pub recipient: Recipient,
    pub purpose: Purpose,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub ttl_minutes: i64,
}

// ── Rate limiting ─────────────────────────────────────────────────────────────

/// A single counting window. Reset lazily when `now` crosses the boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitCounter {
    pub count: u32,
    pub window_ends_at: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitCounter {
    /// Start a fresh window of `window` if the current one has ended.
    pub fn roll(&mut self, now: DateTime<Utc>, window: Duration) {
        match self.window_ends_at {
            Some(end) if now < end => {}
            _ => {
                self.count = 0;
                self.window_ends_at = Some(now + window);
            }
        }
    }

    pub fn blocked_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.blocked_until.filter(|until| *until > now)
    }

    /// No open window and no active block; dropping the counter loses nothing.
    pub fn is_idle_at(&self, now: DateTime<Utc>) -> bool {
        self.window_ends_at.is_none_or(|end| end <= now) && self.blocked_at(now).is_none()
    }
}

/// One ceiling consulted by `check_and_reserve`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRule {
    pub key: String,
    pub window: Duration,
    pub limit: u32,
    pub reason: &'static str,
}

/// Outcome of an atomic check-then-increment across a set of rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    Granted,
    Blocked { until: DateTime<Utc> },
    Exceeded { reason: &'static str },
}

// ── Reporting ─────────────────────────────────────────────────────────────────

/// Grouped challenge count used by statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCount {
    pub purpose: Purpose,
    pub status: ChallengeStatus,
    pub count: u64,
}
