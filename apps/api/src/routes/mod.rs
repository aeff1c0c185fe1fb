pub mod analytics;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/analytics/track", post(analytics::handle_track))
        .route("/api/analytics", get(analytics::handle_summary))
        .with_state(state)
}
