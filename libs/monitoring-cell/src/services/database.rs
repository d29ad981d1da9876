// =====================================================================================
// DATABASE LIVENESS SAMPLER
// =====================================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::error;

use crate::models::{MonitoringError, ServiceCheck};
use shared_database::SupabaseClient;

#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    async fn ping(&self) -> Result<(), MonitoringError>;
}

pub struct SupabaseDatabaseProbe {
    client: Arc<SupabaseClient>,
}

impl SupabaseDatabaseProbe {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DatabaseProbe for SupabaseDatabaseProbe {
    async fn ping(&self) -> Result<(), MonitoringError> {
        self.client
            .ping()
            .await
            .map_err(|e| MonitoringError::ProbeFailed(e.to_string()))
    }
}

/// Races the liveness query against a fixed timeout. Never fails.
pub struct DatabaseSampler {
    probe: Arc<dyn DatabaseProbe>,
    timeout: Duration,
}

impl DatabaseSampler {
    pub fn new(probe: Arc<dyn DatabaseProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    pub async fn sample(&self) -> ServiceCheck {
        let start = Instant::now();

        let outcome = match tokio::time::timeout(self.timeout, self.probe.ping()).await {
            Ok(result) => result,
            Err(_) => Err(MonitoringError::ProbeTimeout(self.timeout.as_millis() as u64)),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => ServiceCheck::ok(latency_ms),
            Err(e) => {
                error!(event = "health.db_check_failed", error = %e, latency_ms);
                ServiceCheck::error(latency_ms)
            }
        }
    }
}
