use axum::Json;
use axum::http::StatusCode;
use serde_json::{Map, Value};

/// `GET /healthz`: the process is up.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Build a readiness response from named dependency checks.
///
/// 200 when every check passed, 503 otherwise. The body lists each check.
pub fn readiness(checks: &[(&str, bool)]) -> (StatusCode, Json<Value>) {
    let ready = checks.iter().all(|(_, ok)| *ok);
    let detail: Map<String, Value> = checks
        .iter()
        .map(|(name, ok)| ((*name).to_owned(), Value::Bool(*ok)))
        .collect();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({ "ready": ready, "checks": detail })),
    )
}
