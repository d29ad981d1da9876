pub mod alerts;
pub mod compute;
pub mod database;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod queues;
pub mod storage;
pub mod store;

pub use alerts::AlertEngine;
pub use health::{HealthMonitorService, HealthSources};
pub use metrics::{LatencyTracker, MetricsCollectorService};
pub use notifier::{Notifier, RecipientDirectory};
