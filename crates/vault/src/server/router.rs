//! Axum router construction.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/fields/encrypt", post(handlers::encrypt_fields))
        .route("/fields/decrypt", post(handlers::decrypt_fields))
        .route("/status", get(handlers::status))
        .route("/rotation/check", post(handlers::rotation_check))
        .route("/rotation/master-key", get(handlers::master_key_rotation))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}
