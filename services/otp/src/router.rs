use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use agri_core::error::{method_not_allowed, not_found};
use agri_core::health::healthz;
use agri_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    health::readyz,
    otp::{
        block_recipient, otp_stats, otp_status, request_otp, resend_otp, unblock_recipient,
        verify_otp,
    },
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Issue
        .route("/otp/request", post(request_otp))
        .route("/otp/resend", post(resend_otp))
        // Verify
        .route("/otp/verify", post(verify_otp))
        // Inspect
        .route("/otp/status", get(otp_status))
        .route("/otp/stats", get(otp_stats))
        // Blocking
        .route("/otp/blocks", post(block_recipient).delete(unblock_recipient))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer()),
        )
        .with_state(state)
}
