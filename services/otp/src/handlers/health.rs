use axum::{Json, extract::State, http::StatusCode};
use serde_json::Value;

use agri_core::health::readiness;

use crate::state::AppState;

/// Handler for `GET /readyz`: the challenge store and rate-limit store must
/// both answer.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store = state.store.is_ready().await;
    let rate_limit = state.rate_limits.is_ready().await;
    readiness(&[("store", store), ("rate_limit", rate_limit)])
}
