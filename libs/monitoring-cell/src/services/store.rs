// =====================================================================================
// KEY/VALUE STORE SAMPLER
// =====================================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::models::{MonitoringError, ServiceCheck};

#[async_trait]
pub trait StoreConnection: Send {
    async fn ping(&mut self) -> Result<(), MonitoringError>;
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, MonitoringError>;
}

pub struct RedisStoreConnector {
    client: redis::Client,
    connect_timeout: Duration,
}

impl RedisStoreConnector {
    pub fn new(redis_url: &str, connect_timeout: Duration) -> Result<Self, MonitoringError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, connect_timeout })
    }
}

#[async_trait]
impl StoreConnector for RedisStoreConnector {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, MonitoringError> {
        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| MonitoringError::ProbeTimeout(self.connect_timeout.as_millis() as u64))??;

        info!("Health check store connection established");
        Ok(Box::new(RedisStoreConnection { conn, timeout: self.connect_timeout }))
    }
}

struct RedisStoreConnection {
    conn: MultiplexedConnection,
    timeout: Duration,
}

#[async_trait]
impl StoreConnection for RedisStoreConnection {
    async fn ping(&mut self) -> Result<(), MonitoringError> {
        let pong: String = tokio::time::timeout(
            self.timeout,
            redis::cmd("PING").query_async(&mut self.conn),
        )
        .await
        .map_err(|_| MonitoringError::ProbeTimeout(self.timeout.as_millis() as u64))??;

        if pong != "PONG" {
            return Err(MonitoringError::ProbeFailed(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        // Multiplexed connections close when the last handle drops.
        debug!("Dropping health check store connection");
    }
}

/// Keeps one lazily opened connection; any failure discards it so the next cycle reconnects.
pub struct StoreSampler {
    connector: Arc<dyn StoreConnector>,
    connection: Mutex<Option<Box<dyn StoreConnection>>>,
}

impl StoreSampler {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            connection: Mutex::new(None),
        }
    }

    pub async fn sample(&self) -> ServiceCheck {
        let start = Instant::now();
        let mut slot = self.connection.lock().await;

        let outcome = match slot.as_mut() {
            Some(conn) => conn.ping().await,
            None => match self.connector.connect().await {
                Ok(mut conn) => {
                    let result = conn.ping().await;
                    *slot = Some(conn);
                    result
                }
                Err(e) => Err(e),
            },
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => ServiceCheck::ok(latency_ms),
            Err(e) => {
                if let Some(conn) = slot.take() {
                    conn.close().await;
                }
                error!(event = "health.store_check_failed", error = %e, latency_ms);
                ServiceCheck::error(latency_ms)
            }
        }
    }
}
