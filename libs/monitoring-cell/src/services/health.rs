// =====================================================================================
// HEALTH AGGREGATOR SERVICE
// =====================================================================================

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::clock::Clock;
use crate::models::{HealthSnapshot, OverallStatus, RequestLatency, SnapshotParts};
use crate::services::compute::{CpuSampler, CpuTimesSource};
use crate::services::database::{DatabaseProbe, DatabaseSampler};
use crate::services::memory::{MemorySampler, MemorySource};
use crate::services::metrics::LatencyTracker;
use crate::services::queues::{sample_queues, QueueBackend};
use crate::services::storage::{StorageProbe, StorageSampler};
use crate::services::store::{StoreConnector, StoreSampler};
use shared_config::MonitoringSettings;

/// The collaborators a sampling cycle reads from.
pub struct HealthSources {
    pub cpu: Arc<dyn CpuTimesSource>,
    pub memory: Arc<dyn MemorySource>,
    pub storage: Arc<dyn StorageProbe>,
    pub database: Arc<dyn DatabaseProbe>,
    pub store: Arc<dyn StoreConnector>,
    pub queues: Vec<Arc<dyn QueueBackend>>,
    pub latency: Arc<dyn LatencyTracker>,
}

struct CachedSnapshot {
    snapshot: Arc<HealthSnapshot>,
    captured_at: DateTime<Utc>,
}

pub struct HealthMonitorService {
    start_time: Instant,
    version: String,
    cache_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    cpu: CpuSampler,
    memory: MemorySampler,
    storage: StorageSampler,
    database: DatabaseSampler,
    store: StoreSampler,
    queues: Vec<Arc<dyn QueueBackend>>,
    latency: Arc<dyn LatencyTracker>,
    cache: Mutex<Option<CachedSnapshot>>,
}

impl HealthMonitorService {
    pub fn new(
        sources: HealthSources,
        settings: &MonitoringSettings,
        version: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache_ttl = chrono::Duration::from_std(settings.cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));

        Self {
            start_time: Instant::now(),
            version: version.into(),
            cache_ttl,
            clock,
            cpu: CpuSampler::new(sources.cpu),
            memory: MemorySampler::new(sources.memory),
            storage: StorageSampler::new(sources.storage, settings.probe_timeout),
            database: DatabaseSampler::new(sources.database, settings.probe_timeout),
            store: StoreSampler::new(sources.store),
            queues: sources.queues,
            latency: sources.latency,
            cache: Mutex::new(None),
        }
    }

    /// Latest snapshot, resampled only once the cached one is older than the TTL.
    #[instrument(skip(self))]
    pub async fn get_snapshot(&self) -> Arc<HealthSnapshot> {
        let mut cache = self.cache.lock().await;
        let now = self.clock.now();

        if let Some(cached) = cache.as_ref() {
            let age = now - cached.captured_at;
            if age >= chrono::Duration::zero() && age < self.cache_ttl {
                debug!(age_ms = age.num_milliseconds(), "Serving cached health snapshot");
                return cached.snapshot.clone();
            }
        }

        let snapshot = Arc::new(self.sample(now).await);
        if snapshot.overall_status() != OverallStatus::Ok {
            info!(status = ?snapshot.overall_status(), "System health is not ok");
        }

        *cache = Some(CachedSnapshot {
            snapshot: snapshot.clone(),
            captured_at: now,
        });

        snapshot
    }

    async fn sample(&self, now: DateTime<Utc>) -> HealthSnapshot {
        let (compute, memory, storage, database, store, queues, p95_ms) = tokio::join!(
            self.cpu.sample(),
            async { self.memory.sample() },
            self.storage.sample(),
            self.database.sample(),
            self.store.sample(),
            sample_queues(&self.queues),
            self.latency.p95_ms(),
        );

        HealthSnapshot::from_parts(SnapshotParts {
            timestamp: now,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: self.version.clone(),
            compute,
            memory,
            storage,
            database,
            store,
            request_latency: RequestLatency { p95_ms },
            queues,
        })
    }

    pub async fn clear_cache(&self) {
        *self.cache.lock().await = None;
    }

    pub fn reset_cpu_baseline(&self) {
        self.cpu.reset_baseline();
    }
}
