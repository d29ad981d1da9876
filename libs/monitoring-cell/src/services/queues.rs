// =====================================================================================
// JOB QUEUE FAN-OUT SAMPLER
// =====================================================================================

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_redis::Pool;
use futures::future::join_all;
use tracing::{debug, error};

use crate::models::{MonitoringError, QueueCounts, QueueHealth};

#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn counts(&self) -> Result<QueueCounts, MonitoringError>;
}

/// Reads a queue laid out as `<name>:waiting|active|failed` lists, a `<name>:delayed`
/// sorted set and a `<name>:paused` flag key.
pub struct RedisQueueBackend {
    name: String,
    pool: Pool,
}

impl RedisQueueBackend {
    pub fn new(name: impl Into<String>, pool: Pool) -> Self {
        Self { name: name.into(), pool }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.name, suffix)
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn counts(&self) -> Result<QueueCounts, MonitoringError> {
        let mut conn = self.pool.get().await.map_err(|e| {
            MonitoringError::QueueBackend(format!("{}: connection error: {}", self.name, e))
        })?;

        let (waiting, active, failed, delayed, paused): (u64, u64, u64, u64, bool) = redis::pipe()
            .llen(self.key("waiting"))
            .llen(self.key("active"))
            .llen(self.key("failed"))
            .zcard(self.key("delayed"))
            .exists(self.key("paused"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueCounts { waiting, active, failed, delayed, paused })
    }
}

/// Samples every queue concurrently. A failing queue yields an `error` entry in its own slot.
pub async fn sample_queues(backends: &[Arc<dyn QueueBackend>]) -> Vec<QueueHealth> {
    let outcomes = join_all(backends.iter().map(|backend| backend.counts())).await;

    backends
        .iter()
        .zip(outcomes)
        .map(|(backend, outcome)| match outcome {
            Ok(counts) => {
                debug!(queue = backend.name(), waiting = counts.waiting, "Queue sampled");
                QueueHealth::from_counts(backend.name(), counts)
            }
            Err(e) => {
                error!(event = "health.queue_check_failed", queue = backend.name(), error = %e);
                QueueHealth::unavailable(backend.name())
            }
        })
        .collect()
}
