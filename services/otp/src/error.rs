use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use agri_domain::challenge::ChallengeStatus;
use agri_domain::purpose::UnknownPurpose;
use agri_domain::recipient::InvalidRecipient;

/// OTP service outcomes. Everything except `Internal` is an expected,
/// caller-visible result rather than a server fault.
#[derive(Debug, thiserror::Error)]
pub enum OtpServiceError {
    #[error("rate limited: {reason}")]
    RateLimited { reason: String },
    #[error("resend cooldown active, retry in {seconds_remaining}s")]
    CooldownActive { seconds_remaining: i64 },
    #[error("delivery failed: {cause}")]
    DeliveryFailed { cause: String },
    #[error("challenge not found")]
    NotFound,
    #[error("challenge expired")]
    Expired,
    #[error("maximum verification attempts exceeded")]
    AttemptsExceeded,
    #[error("incorrect code, {attempts_remaining} attempt(s) remaining")]
    Mismatch { attempts_remaining: u32 },
    #[error("challenge already {status}")]
    AlreadyResolved { status: ChallengeStatus },
    #[error("invalid recipient: {0}")]
    InvalidRecipient(#[from] InvalidRecipient),
    #[error("invalid purpose: {0}")]
    InvalidPurpose(#[from] UnknownPurpose),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl OtpServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            Self::DeliveryFailed { .. } => "DELIVERY_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::Expired => "EXPIRED",
            Self::AttemptsExceeded => "ATTEMPTS_EXCEEDED",
            Self::Mismatch { .. } => "MISMATCH",
            Self::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            Self::InvalidRecipient(_) => "INVALID_RECIPIENT",
            Self::InvalidPurpose(_) => "INVALID_PURPOSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Short reason string recorded on attempt rows.
    pub fn audit_reason(&self) -> String {
        match self {
            Self::AlreadyResolved { status } => format!("already {status}"),
            other => other.kind().to_ascii_lowercase(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } | Self::CooldownActive { .. } | Self::AttemptsExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::DeliveryFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Expired => StatusCode::GONE,
            Self::Mismatch { .. } => StatusCode::UNAUTHORIZED,
            Self::AlreadyResolved { .. } => StatusCode::CONFLICT,
            Self::InvalidRecipient(_) | Self::InvalidPurpose(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            Self::RateLimited { reason } => {
                details.insert("reason".to_owned(), json!(reason));
            }
            Self::CooldownActive { seconds_remaining } => {
                details.insert("seconds_remaining".to_owned(), json!(seconds_remaining));
            }
            Self::Mismatch { attempts_remaining } => {
                details.insert("attempts_remaining".to_owned(), json!(attempts_remaining));
            }
            Self::AlreadyResolved { status } => {
                details.insert("status".to_owned(), json!(status));
            }
            _ => {}
        }
        details
    }
}

impl IntoResponse for OtpServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Typed outcomes are already logged by the use cases.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = ?e, kind = "INTERNAL", "internal error");
        }
        let mut body = self.details();
        body.insert("kind".to_owned(), json!(self.kind()));
        body.insert("message".to_owned(), json!(self.to_string()));
        (status, axum::Json(Value::Object(body))).into_response()
    }
}
