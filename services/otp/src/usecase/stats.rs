use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use agri_core::clock::Clock;
use agri_domain::challenge::ChallengeStatus;
use agri_domain::purpose::Purpose;
use agri_domain::recipient::Recipient;

use crate::domain::repository::ChallengeStore;
use crate::domain::types::StatusCount;
use crate::error::OtpServiceError;

pub const MAX_STATS_DAYS: i64 = 365;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PurposeStatistics {
    pub total: u64,
    pub verified: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtpStatistics {
    pub period_days: i64,
    /// Set when the figures cover a single recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub total_sent: u64,
    pub verified: u64,
    pub expired: u64,
    pub failed: u64,
    pub pending: u64,
    pub blocked: u64,
    /// Percentage of issued challenges that were verified, two decimals.
    pub success_rate: f64,
    pub by_purpose: BTreeMap<Purpose, PurposeStatistics>,
}

impl OtpStatistics {
    fn from_counts(period_days: i64, counts: &[StatusCount]) -> Self {
        let mut stats = Self {
            period_days,
            recipient: None,
            total_sent: 0,
            verified: 0,
            expired: 0,
            failed: 0,
            pending: 0,
            blocked: 0,
            success_rate: 0.0,
            by_purpose: BTreeMap::new(),
        };
        for row in counts {
            stats.total_sent += row.count;
            let bucket = match row.status {
                ChallengeStatus::Pending => &mut stats.pending,
                ChallengeStatus::Verified => &mut stats.verified,
                ChallengeStatus::Expired => &mut stats.expired,
                ChallengeStatus::Failed => &mut stats.failed,
                ChallengeStatus::Blocked => &mut stats.blocked,
            };
            *bucket += row.count;

            let purpose = stats.by_purpose.entry(row.purpose).or_default();
            purpose.total += row.count;
            if row.status == ChallengeStatus::Verified {
                purpose.verified += row.count;
            }
        }
        if stats.total_sent > 0 {
            let rate = stats.verified as f64 / stats.total_sent as f64 * 100.0;
            stats.success_rate = (rate * 100.0).round() / 100.0;
        }
        stats
    }
}

pub struct OtpStatisticsUseCase<S>
where
    S: ChallengeStore,
{
    pub challenges: S,
    pub clock: Arc<dyn Clock>,
}

impl<S> OtpStatisticsUseCase<S>
where
    S: ChallengeStore,
{
    /// Aggregate challenges created in the last `days` days (clamped to
    /// 1..=365), across all recipients or for `recipient` alone.
    pub async fn execute(
        &self,
        days: i64,
        recipient: Option<&Recipient>,
    ) -> Result<OtpStatistics, OtpServiceError> {
        let days = days.clamp(1, MAX_STATS_DAYS);
        let since = self.clock.now() - Duration::days(days);
        let counts = self
            .challenges
            .status_counts_since(since, recipient.map(Recipient::as_str))
            .await?;
        Ok(OtpStatistics {
            recipient: recipient.map(ToString::to_string),
            ..OtpStatistics::from_counts(days, &counts)
        })
    }
}
