use std::sync::Arc;

use crate::config::Config;
use crate::store::AnalyticsStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AnalyticsStore>,
    pub config: Config,
}
