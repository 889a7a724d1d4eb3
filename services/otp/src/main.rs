use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use sea_orm::Database;
use tracing::{error, info, warn};

use agri_core::clock::SystemClock;
use agri_core::tracing::init_tracing;
use agri_otp::config::OtpServiceConfig;
use agri_otp::infra::backend::{OtpStore, RateLimitBackend};
use agri_otp::infra::cache::RedisRateLimitStore;
use agri_otp::infra::db::DbOtpStore;
use agri_otp::infra::delivery::{ChannelRouter, DeliveryBackend};
use agri_otp::infra::memory::{MemoryOtpStore, MemoryRateLimitStore};
use agri_otp::router::build_router;
use agri_otp::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = OtpServiceConfig::from_env().context("load configuration")?;

    let store = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("failed to connect to database")?;
            OtpStore::Db(DbOtpStore { db })
        }
        None => {
            warn!("DATABASE_URL not set, challenges are kept in memory");
            OtpStore::Memory(MemoryOtpStore::default())
        }
    };

    let rate_limits = match &config.redis_url {
        Some(url) => {
            let pool = deadpool_redis::Config::from_url(url)
                .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                .context("failed to create Redis pool")?;
            RateLimitBackend::Redis(RedisRateLimitStore { pool })
        }
        None => {
            warn!("REDIS_URL not set, rate-limit counters are per instance");
            RateLimitBackend::Memory(MemoryRateLimitStore::default())
        }
    };

    let timeout = config.otp.delivery_timeout();
    let channel = ChannelRouter {
        email: DeliveryBackend::from_url("email", config.email_gateway_url.as_deref(), timeout)
            .context("invalid email gateway")?,
        sms: DeliveryBackend::from_url("sms", config.sms_gateway_url.as_deref(), timeout)
            .context("invalid sms gateway")?,
    };

    let state = AppState {
        store,
        rate_limits,
        channel,
        clock: Arc::new(SystemClock),
        config: Arc::new(config.otp.clone()),
        default_country_code: config.default_country_code.as_str().into(),
        trust_proxy_headers: config.trust_proxy_headers,
    };

    // Housekeeping sweep
    let housekeeping = state.housekeeping_usecase();
    let period = Duration::from_secs(config.housekeeping_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = housekeeping.execute().await {
                error!(error = ?e, "otp housekeeping failed");
            }
        }
    });

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.otp_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("otp service listening on {addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
