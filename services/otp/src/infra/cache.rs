use chrono::{DateTime, Utc};
use deadpool_redis::Pool;
use deadpool_redis::redis::{AsyncCommands, cmd};

use crate::domain::repository::RateLimitStore;
use crate::domain::types::{Reservation, WindowRule};
use crate::error::OtpServiceError;

/// KEYS[1] is the block key, KEYS[2..] the window counters.
/// ARGV[1] is now (ms); rule j uses ARGV[2j] (window ms) and ARGV[2j+1] (limit).
/// Returns {0, 0} granted, {1, until_ms} blocked, {2, j} rule j exceeded.
const RESERVE_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local blocked = redis.call('GET', KEYS[1])
if blocked and tonumber(blocked) > now then
  return {1, tonumber(blocked)}
end
for j = 1, #KEYS - 1 do
  local count = tonumber(redis.call('GET', KEYS[j + 1]) or '0')
  if count >= tonumber(ARGV[2 * j + 1]) then
    return {2, j}
  end
end
for j = 1, #KEYS - 1 do
  if redis.call('INCR', KEYS[j + 1]) == 1 then
    redis.call('PEXPIRE', KEYS[j + 1], ARGV[2 * j])
  end
end
return {0, 0}
"#;

/// Shared rate-limit counters for multi-instance deployments. Window reset
/// is Redis key expiry; the whole check-then-increment runs as one script.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    pub pool: Pool,
}

impl RateLimitStore for RedisRateLimitStore {
    async fn check_and_reserve(
        &self,
        block_key: &str,
        rules: &[WindowRule],
        now: DateTime<Utc>,
    ) -> Result<Reservation, OtpServiceError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| OtpServiceError::Internal(e.into()))?;

        let mut eval = cmd("EVAL");
        eval.arg(RESERVE_SCRIPT)
            .arg(rules.len() + 1)
            .arg(block_key);
        for rule in rules {
            eval.arg(&rule.key);
        }
        eval.arg(now.timestamp_millis());
        for rule in rules {
            eval.arg(rule.window.num_milliseconds()).arg(rule.limit);
        }

        let reply: Vec<i64> = eval
            .query_async(&mut conn)
            .await
            .map_err(|e: deadpool_redis::redis::RedisError| OtpServiceError::Internal(e.into()))?;

        match reply.as_slice() {
            [0, _] => Ok(Reservation::Granted),
            [1, until_ms] => {
                let until = DateTime::from_timestamp_millis(*until_ms).unwrap_or(now);
                Ok(Reservation::Blocked { until })
            }
            [2, j] => {
                let rule = usize::try_from(*j - 1)
                    .ok()
                    .and_then(|i| rules.get(i))
                    .ok_or_else(|| anyhow::anyhow!("rate limit script returned rule {j}"))?;
                Ok(Reservation::Exceeded {
                    reason: rule.reason,
                })
            }
            other => Err(anyhow::anyhow!("unexpected rate limit script reply {other:?}").into()),
        }
    }

    async fn block(
        &self,
        block_key: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), OtpServiceError> {
        let ttl_ms = (until - now).num_milliseconds();
        if ttl_ms <= 0 {
            return Ok(());
        }
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| OtpServiceError::Internal(e.into()))?;
        let (): () = conn
            .pset_ex(block_key, until.timestamp_millis(), ttl_ms as u64)
            .await
            .map_err(|e: deadpool_redis::redis::RedisError| OtpServiceError::Internal(e.into()))?;
        Ok(())
    }

    async fn unblock(&self, block_key: &str) -> Result<(), OtpServiceError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| OtpServiceError::Internal(e.into()))?;
        let _: i64 = conn
            .del(block_key)
            .await
            .map_err(|e: deadpool_redis::redis::RedisError| OtpServiceError::Internal(e.into()))?;
        Ok(())
    }

    /// Window and block keys carry their own `PEXPIRE`.
    async fn sweep(&self, _now: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        Ok(0)
    }
}
