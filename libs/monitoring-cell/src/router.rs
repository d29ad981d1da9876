// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    get_alert_state, get_alert_states, get_readiness, get_system_health, MonitoringHandlers,
};

pub fn create_monitoring_router(handlers: Arc<MonitoringHandlers>) -> Router {
    // Probe and dashboard routes
    let health_routes = Router::new()
        .route("/health", get(get_system_health))
        .route("/health/ready", get(get_readiness))
        .layer(CorsLayer::permissive())
        .with_state(handlers.clone());

    let alert_routes = Router::new()
        .route("/alerts/states", get(get_alert_states))
        .route("/alerts/states/{metric}", get(get_alert_state))
        .with_state(handlers);

    Router::new()
        .merge(health_routes)
        .merge(alert_routes)
}
