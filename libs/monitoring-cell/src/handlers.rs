// =====================================================================================
// MONITORING CELL HANDLERS
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Runtime};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::models::{AlertState, HealthSnapshot, MonitoringError, OverallStatus};
use crate::services::compute::ProcStatCpuTimes;
use crate::services::database::SupabaseDatabaseProbe;
use crate::services::memory::SysinfoMemory;
use crate::services::notifier::{
    EmailNotifier, RecipientDirectory, StaticRecipients, SupabaseAdminDirectory,
};
use crate::services::queues::{QueueBackend, RedisQueueBackend};
use crate::services::storage::DfStorageProbe;
use crate::services::store::RedisStoreConnector;
use crate::services::{AlertEngine, HealthMonitorService, HealthSources, MetricsCollectorService};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

pub struct MonitoringHandlers {
    health_service: Arc<HealthMonitorService>,
    alert_engine: Arc<Mutex<AlertEngine>>,
    metrics_service: Arc<MetricsCollectorService>,
}

impl MonitoringHandlers {
    pub fn new(
        health_service: Arc<HealthMonitorService>,
        alert_engine: AlertEngine,
        metrics_service: Arc<MetricsCollectorService>,
    ) -> Self {
        Self {
            health_service,
            alert_engine: Arc::new(Mutex::new(alert_engine)),
            metrics_service,
        }
    }

    /// Wires the production collaborators described by the configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, MonitoringError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let supabase = Arc::new(SupabaseClient::new(config));
        let metrics_service = Arc::new(MetricsCollectorService::new());

        let pool = Config::from_url(config.redis_url.clone())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| MonitoringError::QueueBackend(format!("pool creation error: {}", e)))?;

        let queues: Vec<Arc<dyn QueueBackend>> = config
            .monitoring
            .monitored_queues
            .iter()
            .map(|name| Arc::new(RedisQueueBackend::new(name.clone(), pool.clone())) as Arc<dyn QueueBackend>)
            .collect();

        let sources = HealthSources {
            cpu: Arc::new(ProcStatCpuTimes::new()),
            memory: Arc::new(SysinfoMemory::new()),
            storage: Arc::new(DfStorageProbe::new(config.monitoring.storage_mount_point.clone())),
            database: Arc::new(SupabaseDatabaseProbe::new(supabase.clone())),
            store: Arc::new(RedisStoreConnector::new(
                &config.redis_url,
                config.monitoring.probe_timeout,
            )?),
            queues,
            latency: metrics_service.clone(),
        };

        let health_service = Arc::new(HealthMonitorService::new(
            sources,
            &config.monitoring,
            config.app_version.clone(),
            clock.clone(),
        ));

        let recipients: Arc<dyn RecipientDirectory> = if config.alert_recipients.is_empty() {
            Arc::new(SupabaseAdminDirectory::new(supabase))
        } else {
            Arc::new(StaticRecipients::new(config.alert_recipients.clone()))
        };

        let alert_engine = AlertEngine::new(
            config.alerts.clone(),
            clock,
            Arc::new(EmailNotifier::from_config(config)),
            recipients,
        );

        if config.alerts.delivery_enabled && !config.is_email_configured() {
            warn!("Alert delivery is enabled but the email provider is not configured");
        }

        info!(
            queues = config.monitoring.monitored_queues.len(),
            delivery_enabled = config.alerts.delivery_enabled,
            "Monitoring services initialised"
        );

        Ok(Self::new(health_service, alert_engine, metrics_service))
    }

    pub fn get_metrics_service(&self) -> Arc<MetricsCollectorService> {
        self.metrics_service.clone()
    }

    /// One scheduler tick: take a snapshot and run it through the alert engine.
    #[instrument(skip(self))]
    pub async fn run_health_cycle(&self) -> Arc<HealthSnapshot> {
        let snapshot = self.health_service.get_snapshot().await;
        let mut engine = self.alert_engine.lock().await;
        engine.evaluate(&snapshot).await;
        snapshot
    }

    pub async fn alert_states(&self) -> HashMap<String, AlertState> {
        self.alert_engine.lock().await.alert_states()
    }

    pub async fn alert_state(&self, metric: &str) -> Option<AlertState> {
        self.alert_engine.lock().await.alert_state(metric).cloned()
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: OverallStatus,
    pub timestamp: DateTime<Utc>,
}

// =====================================================================================
// HEALTH ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_system_health(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Json<HealthSnapshot> {
    let snapshot = handlers.health_service.get_snapshot().await;
    Json(snapshot.as_ref().clone())
}

#[instrument(skip(handlers))]
pub async fn get_readiness(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let snapshot = handlers.health_service.get_snapshot().await;
    let status = snapshot.overall_status();

    let code = if status == OverallStatus::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (code, Json(ReadinessResponse { status, timestamp: snapshot.timestamp }))
}

// =====================================================================================
// ALERT ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_alert_states(
    State(handlers): State<Arc<MonitoringHandlers>>,
) -> Json<HashMap<String, AlertState>> {
    Json(handlers.alert_states().await)
}

#[instrument(skip(handlers))]
pub async fn get_alert_state(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(metric): Path<String>,
) -> Result<Json<AlertState>, MonitoringError> {
    let state = handlers
        .alert_state(&metric)
        .await
        .ok_or(MonitoringError::UnknownMetric(metric))?;

    Ok(Json(state))
}
