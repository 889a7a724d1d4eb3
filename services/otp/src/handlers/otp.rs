use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{HeaderMap, StatusCode, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use agri_core::serde::{to_rfc3339_ms, to_rfc3339_ms_opt};
use agri_domain::challenge::ChallengeStatus;
use agri_domain::id::{ChallengeId, UserId};
use agri_domain::purpose::Purpose;
use agri_domain::recipient::Recipient;

use crate::domain::types::{Challenge, RequestContext};
use crate::error::OtpServiceError;
use crate::state::AppState;
use crate::usecase::issue::RequestOtpInput;
use crate::usecase::stats::OtpStatistics;
use crate::usecase::verify::VerifyOtpInput;

// ── Request context ───────────────────────────────────────────────────────────

/// First `x-forwarded-for` hop, else `x-real-ip`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_owned)
}

/// Proxy headers when they are trusted and present, else the socket peer.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Option<String> {
    trust_proxy_headers
        .then(|| forwarded_ip(headers))
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Caller address and user agent. The peer address is present when the
/// server runs with `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let ip = client_ip(&parts.headers, peer, state.trust_proxy_headers);
        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        async move { Ok(Self { ip, user_agent }) }
    }
}

impl ClientInfo {
    fn into_context(self, user_id: Option<UserId>) -> RequestContext {
        RequestContext {
            ip: self.ip,
            user_agent: self.user_agent,
            user_id,
        }
    }
}

fn parse_target(
    state: &AppState,
    recipient: &str,
    purpose: &str,
) -> Result<(Recipient, Purpose), OtpServiceError> {
    let recipient = Recipient::parse(recipient, &state.default_country_code)?;
    let purpose = purpose.parse::<Purpose>()?;
    Ok((recipient, purpose))
}

// ── Issue ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct IssueOtpRequest {
    pub recipient: String,
    pub purpose: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Serialize)]
pub struct IssueOtpResponse {
    pub challenge_id: ChallengeId,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
}

impl From<Challenge> for IssueOtpResponse {
    fn from(challenge: Challenge) -> Self {
        Self {
            challenge_id: challenge.id,
            expires_at: challenge.expires_at,
        }
    }
}

pub async fn request_otp(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<IssueOtpRequest>,
) -> Result<(StatusCode, Json<IssueOtpResponse>), OtpServiceError> {
    let (recipient, purpose) = parse_target(&state, &body.recipient, &body.purpose)?;
    let challenge = state
        .request_usecase()
        .execute(RequestOtpInput {
            recipient,
            purpose,
            context: client.into_context(body.user_id),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(challenge.into())))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<IssueOtpRequest>,
) -> Result<(StatusCode, Json<IssueOtpResponse>), OtpServiceError> {
    let (recipient, purpose) = parse_target(&state, &body.recipient, &body.purpose)?;
    let challenge = state
        .resend_usecase()
        .execute(RequestOtpInput {
            recipient,
            purpose,
            context: client.into_context(body.user_id),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(challenge.into())))
}

// ── Verify ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub recipient: String,
    pub purpose: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct VerifyOtpResponse {
    pub verified: bool,
    pub challenge_id: ChallengeId,
    #[serde(serialize_with = "to_rfc3339_ms_opt")]
    pub verified_at: Option<DateTime<Utc>>,
    pub user_id: Option<UserId>,
}

pub async fn verify_otp(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>, OtpServiceError> {
    let (recipient, purpose) = parse_target(&state, &body.recipient, &body.purpose)?;
    let challenge = state
        .verify_usecase()
        .execute(VerifyOtpInput {
            recipient,
            purpose,
            code: body.code,
            context: client.into_context(None),
        })
        .await?;
    Ok(Json(VerifyOtpResponse {
        verified: true,
        challenge_id: challenge.id,
        verified_at: challenge.verified_at,
        user_id: challenge.user_id,
    }))
}

// ── Status ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct StatusQuery {
    pub recipient: String,
    pub purpose: String,
}

#[derive(Serialize)]
pub struct OtpStatusResponse {
    pub challenge_id: ChallengeId,
    pub status: ChallengeStatus,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: u32,
}

pub async fn otp_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<OtpStatusResponse>, OtpServiceError> {
    let (recipient, purpose) = parse_target(&state, &query.recipient, &query.purpose)?;
    let status = state.status_usecase().execute(&recipient, purpose).await?;
    Ok(Json(OtpStatusResponse {
        challenge_id: status.challenge_id,
        status: status.status,
        expires_at: status.expires_at,
        attempts_remaining: status.attempts_remaining,
    }))
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Statistics window when `days` is omitted.
pub const DEFAULT_STATS_DAYS: i64 = 7;

#[derive(Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
    pub recipient: Option<String>,
}

pub async fn otp_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<OtpStatistics>, OtpServiceError> {
    let recipient = query
        .recipient
        .as_deref()
        .map(|raw| Recipient::parse(raw, &state.default_country_code))
        .transpose()?;
    let stats = state
        .stats_usecase()
        .execute(query.days.unwrap_or(DEFAULT_STATS_DAYS), recipient.as_ref())
        .await?;
    Ok(Json(stats))
}

// ── Blocking ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BlockRequest {
    pub recipient: String,
    pub purpose: String,
    pub minutes: i64,
}

#[derive(Serialize)]
pub struct BlockResponse {
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub blocked_until: DateTime<Utc>,
}

pub async fn block_recipient(
    State(state): State<AppState>,
    Json(body): Json<BlockRequest>,
) -> Result<Json<BlockResponse>, OtpServiceError> {
    let (recipient, purpose) = parse_target(&state, &body.recipient, &body.purpose)?;
    let duration = Duration::minutes(body.minutes.max(1));
    let blocked_until = state
        .rate_limiter()
        .block(recipient.as_str(), purpose, duration, state.clock.now())
        .await?;
    Ok(Json(BlockResponse { blocked_until }))
}

#[derive(Deserialize)]
pub struct UnblockRequest {
    pub recipient: String,
    pub purpose: String,
}

pub async fn unblock_recipient(
    State(state): State<AppState>,
    Json(body): Json<UnblockRequest>,
) -> Result<StatusCode, OtpServiceError> {
    let (recipient, purpose) = parse_target(&state, &body.recipient, &body.purpose)?;
    state
        .rate_limiter()
        .unblock(recipient.as_str(), purpose)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
