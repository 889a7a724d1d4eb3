use std::sync::Arc;

use agri_core::clock::Clock;

use crate::config::OtpConfig;
use crate::infra::backend::{OtpStore, RateLimitBackend};
use crate::infra::delivery::{ChannelRouter, DeliveryBackend};
use crate::usecase::housekeeping::HousekeepingUseCase;
use crate::usecase::issue::{RequestOtpUseCase, ResendOtpUseCase};
use crate::usecase::rate_limit::RateLimiter;
use crate::usecase::stats::OtpStatisticsUseCase;
use crate::usecase::status::OtpStatusUseCase;
use crate::usecase::verify::VerifyOtpUseCase;

pub type Channel = ChannelRouter<DeliveryBackend, DeliveryBackend>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: OtpStore,
    pub rate_limits: RateLimitBackend,
    pub channel: Channel,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<OtpConfig>,
    /// Applied to local-format phone numbers, without the leading `+`.
    pub default_country_code: Arc<str>,
    /// Take the client address from `x-forwarded-for` / `x-real-ip`.
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn rate_limiter(&self) -> RateLimiter<RateLimitBackend> {
        RateLimiter {
            store: self.rate_limits.clone(),
            config: Arc::clone(&self.config),
        }
    }

    pub fn request_usecase(&self) -> RequestOtpUseCase<OtpStore, RateLimitBackend, Channel> {
        RequestOtpUseCase {
            challenges: self.store.clone(),
            rate_limiter: self.rate_limiter(),
            channel: self.channel.clone(),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }

    pub fn resend_usecase(&self) -> ResendOtpUseCase<OtpStore, RateLimitBackend, Channel> {
        ResendOtpUseCase {
            request: self.request_usecase(),
        }
    }

    pub fn verify_usecase(&self) -> VerifyOtpUseCase<OtpStore, OtpStore> {
        VerifyOtpUseCase {
            challenges: self.store.clone(),
            attempts: self.store.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn status_usecase(&self) -> OtpStatusUseCase<OtpStore> {
        OtpStatusUseCase {
            challenges: self.store.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn stats_usecase(&self) -> OtpStatisticsUseCase<OtpStore> {
        OtpStatisticsUseCase {
            challenges: self.store.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn housekeeping_usecase(
        &self,
    ) -> HousekeepingUseCase<OtpStore, OtpStore, RateLimitBackend> {
        HousekeepingUseCase {
            challenges: self.store.clone(),
            attempts: self.store.clone(),
            rate_limits: self.rate_limits.clone(),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}
