use std::sync::Arc;

use axum::{
    Router,
    middleware,
    routing::get,
};

use monitoring_cell::{create_monitoring_router, services::metrics::track_request_latency, MonitoringHandlers};
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, monitoring: Arc<MonitoringHandlers>) -> Router {
    let banner = format!("{} health service is running!", config.app_name);

    Router::new()
        .route("/", get(move || {
            let banner = banner.clone();
            async move { banner }
        }))
        .nest("/monitoring", create_monitoring_router(monitoring.clone()))
        .layer(middleware::from_fn_with_state(
            monitoring.get_metrics_service(),
            track_request_latency,
        ))
}
