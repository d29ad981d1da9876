// =====================================================================================
// MONITORING CELL - SYSTEM HEALTH AGGREGATION & THRESHOLD ALERTING
// =====================================================================================
//
// This cell provides:
// - Metric samplers for compute, memory, storage, database, store and job queues
// - A cached health aggregator producing one immutable snapshot per cycle
// - A per-metric alert state machine with hysteresis, cooldown and hourly caps
//
// =====================================================================================

pub mod clock;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export commonly used types
pub use models::{
    AlertEvent, AlertLevel, AlertNotification, AlertState, CheckStatus, HealthSnapshot,
    MonitoringError, OverallStatus, QueueHealth, QueueStatus, SnapshotParts, ThresholdConfig,
};

pub use services::{
    AlertEngine, HealthMonitorService, HealthSources, LatencyTracker, MetricsCollectorService,
    Notifier, RecipientDirectory,
};

pub use clock::{Clock, ManualClock, SystemClock};
pub use handlers::MonitoringHandlers;
pub use router::create_monitoring_router;
