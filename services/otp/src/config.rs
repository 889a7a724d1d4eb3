use std::str::FromStr;

use anyhow::{Context as _, bail};
use chrono::Duration;

use agri_domain::challenge::CodeAlphabet;

/// Per-window ceilings enforced before a challenge is issued.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimits {
    pub per_recipient_hourly: u32,
    pub per_recipient_daily: u32,
    pub per_ip_hourly: u32,
    pub global_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_recipient_hourly: 5,
            per_recipient_daily: 10,
            per_ip_hourly: 10,
            global_per_minute: 20,
        }
    }
}

/// OTP policy, built once at startup and shared by every use case.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpConfig {
    pub code_length: usize,
    pub code_alphabet: CodeAlphabet,
    pub ttl_minutes: i64,
    pub max_attempts: u32,
    pub resend_cooldown_seconds: i64,
    /// Deadline for a single `DeliveryChannel::send`.
    pub delivery_timeout_seconds: u64,
    pub rate_limits: RateLimits,
    /// Challenges and attempt records older than this are purged by housekeeping.
    pub retention_days: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            code_alphabet: CodeAlphabet::Numeric,
            ttl_minutes: 10,
            max_attempts: 3,
            resend_cooldown_seconds: 60,
            delivery_timeout_seconds: 10,
            rate_limits: RateLimits::default(),
            retention_days: 30,
        }
    }
}

impl OtpConfig {
    pub fn ttl(&self) -> Duration {
        Duration::minutes(self.ttl_minutes)
    }

    pub fn resend_cooldown(&self) -> Duration {
        Duration::seconds(self.resend_cooldown_seconds)
    }

    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.delivery_timeout_seconds)
    }

    pub fn retention(&self) -> Duration {
        Duration::days(self.retention_days)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(4..=12).contains(&self.code_length) {
            bail!("code length must be between 4 and 12, got {}", self.code_length);
        }
        if self.max_attempts == 0 {
            bail!("max attempts must be positive");
        }
        if self.ttl_minutes <= 0 {
            bail!("ttl must be positive");
        }
        if self.resend_cooldown_seconds < 0 {
            bail!("resend cooldown must not be negative");
        }
        if self.delivery_timeout_seconds == 0 {
            bail!("delivery timeout must be positive");
        }
        if self.retention_days <= 0 {
            bail!("retention must be positive");
        }
        Ok(())
    }

    /// Apply `OTP_*` overrides on top of the defaults.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            code_length: parse_or(&get, "OTP_CODE_LENGTH", defaults.code_length)?,
            code_alphabet: match get("OTP_CODE_ALPHABET") {
                Some(raw) => raw
                    .parse::<CodeAlphabet>()
                    .map_err(|e| anyhow::anyhow!("OTP_CODE_ALPHABET: {e}"))?,
                None => defaults.code_alphabet,
            },
            ttl_minutes: parse_or(&get, "OTP_TTL_MINUTES", defaults.ttl_minutes)?,
            max_attempts: parse_or(&get, "OTP_MAX_ATTEMPTS", defaults.max_attempts)?,
            resend_cooldown_seconds: parse_or(
                &get,
                "OTP_RESEND_COOLDOWN_SECONDS",
                defaults.resend_cooldown_seconds,
            )?,
            delivery_timeout_seconds: parse_or(
                &get,
                "OTP_DELIVERY_TIMEOUT_SECONDS",
                defaults.delivery_timeout_seconds,
            )?,
            rate_limits: RateLimits {
                per_recipient_hourly: parse_or(
                    &get,
                    "OTP_RATE_LIMIT_RECIPIENT_HOURLY",
                    defaults.rate_limits.per_recipient_hourly,
                )?,
                per_recipient_daily: parse_or(
                    &get,
                    "OTP_RATE_LIMIT_RECIPIENT_DAILY",
                    defaults.rate_limits.per_recipient_daily,
                )?,
                per_ip_hourly: parse_or(
                    &get,
                    "OTP_RATE_LIMIT_IP_HOURLY",
                    defaults.rate_limits.per_ip_hourly,
                )?,
                global_per_minute: parse_or(
                    &get,
                    "OTP_RATE_LIMIT_GLOBAL_PER_MINUTE",
                    defaults.rate_limits.global_per_minute,
                )?,
            },
            retention_days: parse_or(&get, "OTP_RETENTION_DAYS", defaults.retention_days)?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// OTP service deployment configuration loaded from environment variables.
#[derive(Debug)]
pub struct OtpServiceConfig {
    /// TCP port to listen on (default 3120). Env var: `OTP_PORT`.
    pub otp_port: u16,
    /// PostgreSQL connection URL. In-memory storage when unset.
    pub database_url: Option<String>,
    /// Redis connection URL. In-memory rate-limit counters when unset.
    pub redis_url: Option<String>,
    /// Email gateway endpoint. Codes are only logged when unset.
    pub email_gateway_url: Option<String>,
    /// SMS gateway endpoint. Codes are only logged when unset.
    pub sms_gateway_url: Option<String>,
    /// Country code applied to local-format phone numbers (default "233").
    pub default_country_code: String,
    /// Seconds between housekeeping sweeps (default 300).
    pub housekeeping_interval_secs: u64,
    /// Read the client address from proxy headers (default false). Enable
    /// only behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
    pub otp: OtpConfig,
}

impl OtpServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            otp_port: parse_or(&get, "OTP_PORT", 3120)?,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            email_gateway_url: get("EMAIL_GATEWAY_URL"),
            sms_gateway_url: get("SMS_GATEWAY_URL"),
            default_country_code: get("DEFAULT_COUNTRY_CODE")
                .map(|cc| cc.trim_start_matches('+').to_owned())
                .unwrap_or_else(|| "233".to_owned()),
            housekeeping_interval_secs: parse_or(&get, "HOUSEKEEPING_INTERVAL_SECS", 300)?,
            trust_proxy_headers: parse_or(&get, "TRUST_PROXY_HEADERS", false)?,
            otp: OtpConfig::from_lookup(&get)?,
        })
    }
}

fn parse_or<T>(get: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}
