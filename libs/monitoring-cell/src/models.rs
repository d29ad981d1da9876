// =====================================================================================
// MONITORING CELL MODELS
// =====================================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

// -------------------------------------------------------------------------------------
// Health snapshot
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Ok,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComputeUsage {
    pub usage_percent: u32,
    pub cores: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryUsage {
    pub total_mb: u64,
    pub used_mb: u64,
    pub usage_percent: u32,
}

impl MemoryUsage {
    /// Builds the reading from raw byte counts. A zero total yields the all-zero reading.
    pub fn from_bytes(total_bytes: u64, free_bytes: u64) -> Self {
        let total_mb = bytes_to_mb(total_bytes);
        let free_mb = bytes_to_mb(free_bytes).min(total_mb);
        if total_mb == 0 {
            return Self::default();
        }

        let used_mb = total_mb - free_mb;
        let usage_percent = ((used_mb as f64 / total_mb as f64) * 100.0).round() as u32;

        Self { total_mb, used_mb, usage_percent }
    }
}

fn bytes_to_mb(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0 / 1024.0).round() as u64
}

/// Disk usage of the monitored mount. All-zero means "unknown", not "empty disk".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StorageUsage {
    pub total_gb: u64,
    pub used_gb: u64,
    pub usage_percent: u32,
}

impl StorageUsage {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.usage_percent > 0
    }

    /// Free space as a percentage, only meaningful when the reading is known.
    pub fn free_percent(&self) -> u32 {
        100u32.saturating_sub(self.usage_percent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceCheck {
    pub status: CheckStatus,
    pub latency_ms: u64,
}

impl ServiceCheck {
    pub fn ok(latency_ms: u64) -> Self {
        Self { status: CheckStatus::Ok, latency_ms }
    }

    pub fn error(latency_ms: u64) -> Self {
        Self { status: CheckStatus::Error, latency_ms }
    }

    pub fn is_error(&self) -> bool {
        self.status == CheckStatus::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RequestLatency {
    pub p95_ms: u64,
}

/// Raw counters reported by a job queue backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueHealth {
    pub name: String,
    pub status: QueueStatus,
    pub waiting: u64,
    pub active: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: bool,
}

pub const QUEUE_WARNING_WAITING: u64 = 50;
pub const QUEUE_ERROR_WAITING: u64 = 200;

impl QueueHealth {
    pub fn from_counts(name: &str, counts: QueueCounts) -> Self {
        let status = if counts.waiting > QUEUE_ERROR_WAITING {
            QueueStatus::Error
        } else if counts.waiting > QUEUE_WARNING_WAITING {
            QueueStatus::Warning
        } else {
            QueueStatus::Ok
        };

        Self {
            name: name.to_string(),
            status,
            waiting: counts.waiting,
            active: counts.active,
            failed: counts.failed,
            delayed: counts.delayed,
            paused: counts.paused,
        }
    }

    /// Placeholder entry for a queue whose counts could not be read.
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: QueueStatus::Error,
            waiting: 0,
            active: 0,
            failed: 0,
            delayed: 0,
            paused: false,
        }
    }
}

/// Everything a sampling cycle gathers, before the overall status is derived.
#[derive(Debug, Clone)]
pub struct SnapshotParts {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub compute: ComputeUsage,
    pub memory: MemoryUsage,
    pub storage: StorageUsage,
    pub database: ServiceCheck,
    pub store: ServiceCheck,
    pub request_latency: RequestLatency,
    pub queues: Vec<QueueHealth>,
}

/// One immutable health reading. `overall_status` is always derived from the other fields.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub compute: ComputeUsage,
    pub memory: MemoryUsage,
    pub storage: StorageUsage,
    pub database: ServiceCheck,
    pub store: ServiceCheck,
    pub request_latency: RequestLatency,
    pub queues: Vec<QueueHealth>,
    overall_status: OverallStatus,
}

impl HealthSnapshot {
    pub fn from_parts(parts: SnapshotParts) -> Self {
        let overall_status = derive_overall_status(&parts);

        Self {
            timestamp: parts.timestamp,
            uptime_seconds: parts.uptime_seconds,
            version: parts.version,
            compute: parts.compute,
            memory: parts.memory,
            storage: parts.storage,
            database: parts.database,
            store: parts.store,
            request_latency: parts.request_latency,
            queues: parts.queues,
            overall_status,
        }
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }
}

/// First matching tier wins: critical, then degraded, then ok.
pub fn derive_overall_status(parts: &SnapshotParts) -> OverallStatus {
    let storage_known = parts.storage.is_known();
    let free_storage = parts.storage.free_percent();

    if parts.database.is_error()
        || parts.store.is_error()
        || parts.compute.usage_percent > 90
        || parts.memory.usage_percent > 90
        || (storage_known && free_storage < 10)
    {
        return OverallStatus::Critical;
    }

    if parts.compute.usage_percent > 70
        || parts.memory.usage_percent > 75
        || (storage_known && free_storage < 20)
        || parts.queues.iter().any(|q| q.status != QueueStatus::Ok)
    {
        return OverallStatus::Degraded;
    }

    OverallStatus::Ok
}

// -------------------------------------------------------------------------------------
// Alerting
// -------------------------------------------------------------------------------------

/// Resting level of a metric's alert state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Ok,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Ok => "ok",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

/// What a notification announces. `Resolved` is an event only, never a stored level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "previous", rename_all = "lowercase")]
pub enum AlertEvent {
    Warning,
    Critical,
    Resolved(AlertLevel),
}

impl AlertEvent {
    pub fn label(&self) -> &'static str {
        match self {
            AlertEvent::Warning => "WARNING",
            AlertEvent::Critical => "CRITICAL",
            AlertEvent::Resolved(_) => "RESOLVED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertState {
    pub level: AlertLevel,
    pub since: DateTime<Utc>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub notify_count: u32,
    pub consecutive_ok_checks: u32,
}

impl AlertState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            level: AlertLevel::Ok,
            since: now,
            last_notified_at: None,
            notify_count: 0,
            consecutive_ok_checks: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyWindow {
    pub count: u32,
    pub window_started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    warning: Option<f64>,
    critical: Option<f64>,
    direction: Direction,
}

impl ThresholdConfig {
    pub fn new(
        warning: Option<f64>,
        critical: Option<f64>,
        direction: Direction,
    ) -> Result<Self, MonitoringError> {
        if warning.is_none() && critical.is_none() {
            return Err(MonitoringError::InvalidThreshold(
                "at least one of warning or critical must be set".to_string(),
            ));
        }
        Ok(Self { warning, critical, direction })
    }

    pub fn above(warning: f64, critical: f64) -> Self {
        Self { warning: Some(warning), critical: Some(critical), direction: Direction::Above }
    }

    pub fn below(warning: f64, critical: f64) -> Self {
        Self { warning: Some(warning), critical: Some(critical), direction: Direction::Below }
    }

    pub fn critical_only(critical: f64, direction: Direction) -> Self {
        Self { warning: None, critical: Some(critical), direction }
    }

    pub fn warning(&self) -> Option<f64> {
        self.warning
    }

    pub fn critical(&self) -> Option<f64> {
        self.critical
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn crosses(&self, value: f64, threshold: f64) -> bool {
        match self.direction {
            Direction::Above => value > threshold,
            Direction::Below => value < threshold,
        }
    }

    /// Crosses the effective threshold (warning if set, else critical).
    pub fn is_breached(&self, value: f64) -> bool {
        self.warning
            .or(self.critical)
            .map(|threshold| self.crosses(value, threshold))
            .unwrap_or(false)
    }

    pub fn is_critically_breached(&self, value: f64) -> bool {
        self.critical
            .map(|threshold| self.crosses(value, threshold))
            .unwrap_or(false)
    }
}

/// A notification the engine decided to send, after state was committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotification {
    pub metric_key: String,
    pub event: AlertEvent,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

// -------------------------------------------------------------------------------------
// Errors
// -------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("Probe failed: {0}")]
    ProbeFailed(String),
    #[error("Probe timed out after {0} ms")]
    ProbeTimeout(u64),
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),
    #[error("Queue backend error: {0}")]
    QueueBackend(String),
    #[error("Notification delivery failed: {0}")]
    NotificationFailed(String),
    #[error("Recipient lookup failed: {0}")]
    RecipientLookup(String),
    #[error("Invalid threshold configuration: {0}")]
    InvalidThreshold(String),
    #[error("No alert state for metric: {0}")]
    UnknownMetric(String),
}

impl IntoResponse for MonitoringError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitoringError::InvalidThreshold(_) => StatusCode::BAD_REQUEST,
            MonitoringError::UnknownMetric(_) => StatusCode::NOT_FOUND,
            MonitoringError::ProbeTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MonitoringError::NotificationFailed(_) | MonitoringError::RecipientLookup(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };

        tracing::error!("Error: {}: {}", status, self);

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_parts() -> SnapshotParts {
        SnapshotParts {
            timestamp: Utc::now(),
            uptime_seconds: 1,
            version: "test".to_string(),
            compute: ComputeUsage { usage_percent: 10, cores: 4 },
            memory: MemoryUsage { total_mb: 1000, used_mb: 100, usage_percent: 10 },
            storage: StorageUsage { total_gb: 100, used_gb: 10, usage_percent: 10 },
            database: ServiceCheck::ok(3),
            store: ServiceCheck::ok(1),
            request_latency: RequestLatency { p95_ms: 40 },
            queues: vec![QueueHealth::from_counts("email", QueueCounts::default())],
        }
    }

    #[test]
    fn memory_usage_rounds_like_the_dashboard() {
        let gib = 1024 * 1024 * 1024;
        let usage = MemoryUsage::from_bytes(8 * gib, 2 * gib);
        assert_eq!(usage.total_mb, 8192);
        assert_eq!(usage.used_mb, 6144);
        assert_eq!(usage.usage_percent, 75);
    }

    #[test]
    fn memory_usage_zero_total_is_all_zero() {
        assert_eq!(MemoryUsage::from_bytes(0, 0), MemoryUsage::default());
    }

    #[test]
    fn queue_status_classified_by_waiting_only() {
        let counts = |waiting| QueueCounts { waiting, failed: 999, ..Default::default() };
        assert_eq!(QueueHealth::from_counts("q", counts(50)).status, QueueStatus::Ok);
        assert_eq!(QueueHealth::from_counts("q", counts(51)).status, QueueStatus::Warning);
        assert_eq!(QueueHealth::from_counts("q", counts(200)).status, QueueStatus::Warning);
        assert_eq!(QueueHealth::from_counts("q", counts(201)).status, QueueStatus::Error);
    }

    #[test]
    fn healthy_parts_derive_ok() {
        assert_eq!(derive_overall_status(&healthy_parts()), OverallStatus::Ok);
    }

    #[test]
    fn unknown_storage_never_degrades() {
        let mut parts = healthy_parts();
        parts.storage = StorageUsage::unknown();
        assert_eq!(derive_overall_status(&parts), OverallStatus::Ok);
    }

    #[test]
    fn storage_free_space_tiers() {
        let mut parts = healthy_parts();
        parts.storage.usage_percent = 81;
        assert_eq!(derive_overall_status(&parts), OverallStatus::Degraded);
        parts.storage.usage_percent = 91;
        assert_eq!(derive_overall_status(&parts), OverallStatus::Critical);
    }

    #[test]
    fn critical_tier_wins_over_degraded_conditions() {
        let degraded_everything = |mut parts: SnapshotParts| {
            parts.compute.usage_percent = 80;
            parts.memory.usage_percent = 80;
            parts.storage.usage_percent = 85;
            parts.queues = vec![QueueHealth::unavailable("email")];
            parts
        };

        let critical_variants: Vec<Box<dyn Fn(&mut SnapshotParts)>> = vec![
            Box::new(|p| p.database = ServiceCheck::error(2000)),
            Box::new(|p| p.store = ServiceCheck::error(5)),
            Box::new(|p| p.compute.usage_percent = 91),
            Box::new(|p| p.memory.usage_percent = 91),
            Box::new(|p| p.storage.usage_percent = 95),
        ];

        for make_critical in critical_variants {
            let mut parts = degraded_everything(healthy_parts());
            assert_eq!(derive_overall_status(&parts), OverallStatus::Degraded);
            make_critical(&mut parts);
            assert_eq!(derive_overall_status(&parts), OverallStatus::Critical);
        }
    }

    #[test]
    fn degraded_tier_boundaries() {
        let mut parts = healthy_parts();
        parts.compute.usage_percent = 70;
        parts.memory.usage_percent = 75;
        assert_eq!(derive_overall_status(&parts), OverallStatus::Ok);

        parts.compute.usage_percent = 71;
        assert_eq!(derive_overall_status(&parts), OverallStatus::Degraded);

        let mut parts = healthy_parts();
        parts.queues.push(QueueHealth::from_counts(
            "import",
            QueueCounts { waiting: 60, ..Default::default() },
        ));
        assert_eq!(derive_overall_status(&parts), OverallStatus::Degraded);
    }

    #[test]
    fn threshold_requires_at_least_one_level() {
        assert!(ThresholdConfig::new(None, None, Direction::Above).is_err());
        assert!(ThresholdConfig::new(Some(1.0), None, Direction::Above).is_ok());
    }

    #[test]
    fn threshold_breach_follows_direction() {
        let cpu = ThresholdConfig::above(70.0, 90.0);
        assert!(!cpu.is_breached(70.0));
        assert!(cpu.is_breached(85.0));
        assert!(!cpu.is_critically_breached(85.0));
        assert!(cpu.is_critically_breached(95.0));

        let disk_free = ThresholdConfig::below(20.0, 10.0);
        assert!(disk_free.is_breached(15.0));
        assert!(!disk_free.is_critically_breached(15.0));
        assert!(disk_free.is_critically_breached(5.0));

        let db = ThresholdConfig::critical_only(0.0, Direction::Above);
        assert!(db.is_breached(1.0));
        assert!(db.is_critically_breached(1.0));
        assert!(!db.is_breached(0.0));
    }

    #[test]
    fn snapshot_serializes_lowercase_statuses() {
        let snapshot = HealthSnapshot::from_parts(healthy_parts());
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["overall_status"], "ok");
        assert_eq!(value["database"]["status"], "ok");
        assert_eq!(value["queues"][0]["status"], "ok");
        assert_eq!(value["request_latency"]["p95_ms"], 40);
    }

    #[test]
    fn errors_map_to_http_statuses() {
        let cases = [
            (MonitoringError::InvalidThreshold("cpu".to_string()), StatusCode::BAD_REQUEST),
            (MonitoringError::ProbeTimeout(2000), StatusCode::GATEWAY_TIMEOUT),
            (MonitoringError::NotificationFailed("500".to_string()), StatusCode::BAD_GATEWAY),
            (MonitoringError::UnknownMetric("gpu".to_string()), StatusCode::NOT_FOUND),
            (MonitoringError::QueueBackend("reset".to_string()), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
