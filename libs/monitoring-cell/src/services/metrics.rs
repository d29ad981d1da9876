// =====================================================================================
// REQUEST LATENCY COLLECTOR
// =====================================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::RwLock;
use tracing::instrument;

const MAX_SAMPLES: usize = 1000;

/// Read-only view of the rolling request latency percentile.
#[async_trait]
pub trait LatencyTracker: Send + Sync {
    async fn p95_ms(&self) -> u64;
}

#[derive(Debug)]
pub struct MetricsCollectorService {
    request_count: AtomicU64,
    error_count: AtomicU64,
    response_times: RwLock<Vec<u64>>,
}

impl MetricsCollectorService {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            response_times: RwLock::new(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn record_request(&self, response_time_ms: u64, is_error: bool) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        let mut times = self.response_times.write().await;
        times.push(response_time_ms);

        // Keep only the most recent samples
        if times.len() > MAX_SAMPLES {
            let overflow = times.len() - MAX_SAMPLES;
            times.drain(0..overflow);
        }
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub async fn reset(&self) {
        self.request_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.response_times.write().await.clear();
    }
}

impl Default for MetricsCollectorService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LatencyTracker for MetricsCollectorService {
    async fn p95_ms(&self) -> u64 {
        let times = self.response_times.read().await;
        if times.is_empty() {
            return 0;
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();
        let p95_index = ((sorted_times.len() as f64 * 0.95) as usize).min(sorted_times.len() - 1);
        sorted_times[p95_index]
    }
}

/// Axum middleware feeding every handled request into the collector.
pub async fn track_request_latency(
    State(collector): State<Arc<MetricsCollectorService>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    collector
        .record_request(elapsed_ms, response.status().is_server_error())
        .await;

    response
}
