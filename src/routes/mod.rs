pub mod admin;
pub mod health;
pub mod public;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::middleware::{auth::require_admin, cors::api_cors, rate_limit};
use crate::AppState;

/// Headroom over the recording ceiling for multipart framing.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let public_api = Router::new()
        .route("/api/public/invites/:token", get(public::redeem_invite))
        .route("/api/public/invites/:token/verify", post(public::verify_invite))
        .route(
            "/api/public/assignments/:assignment_id/start",
            post(public::start_attempt),
        )
        .route("/api/public/attempts/:attempt_id", get(public::get_attempt))
        .route("/api/public/attempts/:attempt_id/answer", post(public::save_answer))
        .route("/api/public/attempts/:attempt_id/events", post(public::record_event))
        .route(
            "/api/public/attempts/:attempt_id/recording",
            post(public::upload_recording),
        )
        .route("/api/public/attempts/:attempt_id/submit", post(public::submit_attempt))
        .layer(from_fn_with_state(
            rate_limit::RateLimiter::new(config.public_rps),
            rate_limit::rps_middleware,
        ));

    let admin_api = Router::new()
        .route(
            "/api/admin/tests",
            get(admin::list_tests).post(admin::create_test),
        )
        .route(
            "/api/admin/tests/:id",
            get(admin::get_test)
                .put(admin::update_test)
                .delete(admin::delete_test),
        )
        .route("/api/admin/tests/:id/questions", post(admin::add_question))
        .route("/api/admin/invites", post(admin::create_invite))
        .route("/api/admin/assignments", get(admin::list_assignments))
        .route(
            "/api/admin/assignments/:id",
            axum::routing::delete(admin::delete_assignment),
        )
        .route("/api/admin/attempts", get(admin::list_attempts))
        .route("/api/admin/attempts/stats", get(admin::attempt_stats))
        .route(
            "/api/admin/attempts/:id",
            get(admin::get_attempt).delete(admin::delete_attempt),
        )
        .layer(from_fn_with_state(state.clone(), require_admin))
        .layer(from_fn_with_state(
            rate_limit::RateLimiter::new(config.admin_rps),
            rate_limit::rps_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(public_api)
        .merge(admin_api)
        .with_state(state)
        .layer(api_cors())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.max_recording_bytes + BODY_LIMIT_SLACK))
}
