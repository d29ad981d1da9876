#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use monitoring_cell::models::{
    ComputeUsage, MemoryUsage, QueueCounts, QueueHealth, RequestLatency, ServiceCheck,
    StorageUsage,
};
use monitoring_cell::services::compute::{CpuTimes, CpuTimesSource};
use monitoring_cell::services::database::DatabaseProbe;
use monitoring_cell::services::memory::{MemoryReading, MemorySource};
use monitoring_cell::services::notifier::StaticRecipients;
use monitoring_cell::services::queues::QueueBackend;
use monitoring_cell::services::storage::StorageProbe;
use monitoring_cell::services::store::{StoreConnection, StoreConnector};
use monitoring_cell::{
    AlertEngine, HealthMonitorService, HealthSnapshot, HealthSources, LatencyTracker,
    ManualClock, MonitoringError, Notifier, RecipientDirectory, SnapshotParts,
};
use shared_config::{AlertSettings, MonitoringSettings};

pub const OPS_EMAIL: &str = "ops@example.com";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

// -------------------------------------------------------------------------------------
// Sampler fakes
// -------------------------------------------------------------------------------------

pub struct FixedCpu {
    times: Mutex<CpuTimes>,
    delay: Option<Duration>,
}

impl FixedCpu {
    /// First sample reports `busy_percent` since there is no baseline yet.
    pub fn new(busy_percent: u64) -> Self {
        Self {
            times: Mutex::new(CpuTimes { busy: busy_percent, idle: 100 - busy_percent, cores: 4 }),
            delay: None,
        }
    }

    /// Blocks the calling thread for `delay` on every read, like a slow procfs.
    pub fn blocking(busy_percent: u64, delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::new(busy_percent) }
    }
}

impl CpuTimesSource for FixedCpu {
    fn read(&self) -> Result<CpuTimes, MonitoringError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(*self.times.lock().unwrap())
    }
}

pub struct FixedMemory(pub MemoryReading);

impl MemorySource for FixedMemory {
    fn read(&self) -> MemoryReading {
        self.0
    }
}

pub struct FixedStorage(pub Option<StorageUsage>);

#[async_trait]
impl StorageProbe for FixedStorage {
    async fn query(&self) -> Result<StorageUsage, MonitoringError> {
        self.0.ok_or_else(|| MonitoringError::ProbeFailed("df: not found".to_string()))
    }
}

#[derive(Default)]
pub struct FakeDatabase {
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    pub delay: Option<Duration>,
}

impl FakeDatabase {
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseProbe for FakeDatabase {
    async fn ping(&self) -> Result<(), MonitoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitoringError::ProbeFailed("connection refused".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub connects: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub failing: Arc<AtomicBool>,
}

impl FakeStore {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreConnector for FakeStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, MonitoringError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitoringError::ProbeFailed("connection refused".to_string()));
        }
        Ok(Box::new(FakeStoreConnection {
            failing: self.failing.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakeStoreConnection {
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreConnection for FakeStoreConnection {
    async fn ping(&mut self) -> Result<(), MonitoringError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitoringError::ProbeFailed("broken pipe".to_string()));
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeQueue {
    name: String,
    waiting: u64,
    failing: bool,
    delay: Option<Duration>,
}

impl FakeQueue {
    pub fn new(name: &str, waiting: u64) -> Self {
        Self { name: name.to_string(), waiting, failing: false, delay: None }
    }

    pub fn failing(name: &str) -> Self {
        Self { failing: true, ..Self::new(name, 0) }
    }

    pub fn slow(name: &str, waiting: u64, delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::new(name, waiting) }
    }
}

#[async_trait]
impl QueueBackend for FakeQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn counts(&self) -> Result<QueueCounts, MonitoringError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(MonitoringError::QueueBackend(format!("{}: connection reset", self.name)));
        }
        Ok(QueueCounts { waiting: self.waiting, active: 1, failed: 2, delayed: 3, paused: false })
    }
}

pub struct FixedLatency(pub u64);

#[async_trait]
impl LatencyTracker for FixedLatency {
    async fn p95_ms(&self) -> u64 {
        self.0
    }
}

// -------------------------------------------------------------------------------------
// Aggregator fixture
// -------------------------------------------------------------------------------------

pub struct Fixture {
    pub cpu_percent: u64,
    pub cpu_delay: Option<Duration>,
    pub storage: Option<StorageUsage>,
    pub database: Arc<FakeDatabase>,
    pub store: Arc<FakeStore>,
    pub queues: Vec<Arc<FakeQueue>>,
    pub p95_ms: u64,
    pub settings: MonitoringSettings,
}

impl Fixture {
    pub fn healthy() -> Self {
        Self {
            cpu_percent: 10,
            cpu_delay: None,
            storage: Some(StorageUsage { total_gb: 100, used_gb: 40, usage_percent: 40 }),
            database: Arc::new(FakeDatabase::default()),
            store: Arc::new(FakeStore::default()),
            queues: vec![
                Arc::new(FakeQueue::new("email-notification", 3)),
                Arc::new(FakeQueue::new("staff-import", 0)),
            ],
            p95_ms: 0,
            settings: MonitoringSettings::default(),
        }
    }

    pub fn sources(&self) -> HealthSources {
        HealthSources {
            cpu: match self.cpu_delay {
                Some(delay) => Arc::new(FixedCpu::blocking(self.cpu_percent, delay)),
                None => Arc::new(FixedCpu::new(self.cpu_percent)),
            },
            // 8 GiB total, 6 GiB free
            memory: Arc::new(FixedMemory(MemoryReading {
                total_bytes: 8 * 1024 * 1024 * 1024,
                free_bytes: 6 * 1024 * 1024 * 1024,
            })),
            storage: Arc::new(FixedStorage(self.storage)),
            database: self.database.clone(),
            store: self.store.clone(),
            queues: self
                .queues
                .iter()
                .map(|queue| queue.clone() as Arc<dyn QueueBackend>)
                .collect(),
            latency: Arc::new(FixedLatency(self.p95_ms)),
        }
    }

    pub fn service(&self, clock: Arc<ManualClock>) -> HealthMonitorService {
        HealthMonitorService::new(self.sources(), &self.settings, "1.4.2", clock)
    }
}

// -------------------------------------------------------------------------------------
// Alerting fakes
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentAlert {
    pub recipients: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentAlert>>,
    attempts: AtomicUsize,
    pub failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { failing: true, ..Default::default() }
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        _html_body: &str,
        text_body: &str,
    ) -> Result<(), MonitoringError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(MonitoringError::NotificationFailed("provider returned 500".to_string()));
        }
        self.sent.lock().unwrap().push(SentAlert {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            text: text_body.to_string(),
        });
        Ok(())
    }
}

pub struct BrokenDirectory;

#[async_trait]
impl RecipientDirectory for BrokenDirectory {
    async fn alert_recipients(&self) -> Result<Vec<String>, MonitoringError> {
        Err(MonitoringError::RecipientLookup("users table unavailable".to_string()))
    }
}

pub fn ops_recipients() -> Arc<StaticRecipients> {
    Arc::new(StaticRecipients::new(vec![OPS_EMAIL.to_string()]))
}

pub fn engine(clock: Arc<ManualClock>, notifier: Arc<RecordingNotifier>) -> AlertEngine {
    AlertEngine::new(AlertSettings::default(), clock, notifier, ops_recipients())
}

// -------------------------------------------------------------------------------------
// Snapshots
// -------------------------------------------------------------------------------------

pub fn healthy_parts() -> SnapshotParts {
    SnapshotParts {
        timestamp: start_time(),
        uptime_seconds: 120,
        version: "1.4.2".to_string(),
        compute: ComputeUsage { usage_percent: 12, cores: 4 },
        memory: MemoryUsage { total_mb: 8192, used_mb: 2048, usage_percent: 25 },
        storage: StorageUsage { total_gb: 100, used_gb: 40, usage_percent: 40 },
        database: ServiceCheck::ok(4),
        store: ServiceCheck::ok(1),
        request_latency: RequestLatency::default(),
        queues: vec![QueueHealth::from_counts("email-notification", QueueCounts::default())],
    }
}

pub fn snapshot_with(edit: impl FnOnce(&mut SnapshotParts)) -> HealthSnapshot {
    let mut parts = healthy_parts();
    edit(&mut parts);
    HealthSnapshot::from_parts(parts)
}

pub fn cpu_snapshot(usage_percent: u32) -> HealthSnapshot {
    snapshot_with(|parts| parts.compute.usage_percent = usage_percent)
}
