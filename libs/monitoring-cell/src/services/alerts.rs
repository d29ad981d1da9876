// =====================================================================================
// ALERT ENGINE
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::models::{
    AlertEvent, AlertLevel, AlertNotification, AlertState, Direction, HealthSnapshot,
    HourlyWindow, ThresholdConfig,
};
use crate::services::notifier::{NotificationMessage, Notifier, RecipientDirectory};
use shared_config::AlertSettings;

pub const QUEUE_WAITING_PREFIX: &str = "queue_waiting";

pub fn default_thresholds() -> HashMap<String, ThresholdConfig> {
    HashMap::from([
        ("cpu".to_string(), ThresholdConfig::above(70.0, 90.0)),
        ("memory".to_string(), ThresholdConfig::above(75.0, 90.0)),
        ("disk_free".to_string(), ThresholdConfig::below(20.0, 10.0)),
        (QUEUE_WAITING_PREFIX.to_string(), ThresholdConfig::above(50.0, 200.0)),
        ("api_p95_latency".to_string(), ThresholdConfig::above(250.0, 500.0)),
        // 1 = error, so anything above 0 is critical
        ("db_status".to_string(), ThresholdConfig::critical_only(0.0, Direction::Above)),
        ("store_status".to_string(), ThresholdConfig::critical_only(0.0, Direction::Above)),
    ])
}

/// Flattens a snapshot into the scalar signals the engine tracks.
pub fn metric_readings(snapshot: &HealthSnapshot) -> Vec<(String, f64)> {
    let flag = |is_error: bool| if is_error { 1.0 } else { 0.0 };
    let disk_free = if snapshot.storage.is_known() {
        snapshot.storage.free_percent() as f64
    } else {
        100.0
    };

    let mut readings = vec![
        ("cpu".to_string(), snapshot.compute.usage_percent as f64),
        ("memory".to_string(), snapshot.memory.usage_percent as f64),
        ("disk_free".to_string(), disk_free),
        ("db_status".to_string(), flag(snapshot.database.is_error())),
        ("store_status".to_string(), flag(snapshot.store.is_error())),
    ];

    if snapshot.request_latency.p95_ms > 0 {
        readings.push(("api_p95_latency".to_string(), snapshot.request_latency.p95_ms as f64));
    }

    for queue in &snapshot.queues {
        readings.push((
            format!("{}:{}", QUEUE_WAITING_PREFIX, queue.name),
            queue.waiting as f64,
        ));
    }

    readings
}

fn threshold_for(thresholds: &HashMap<String, ThresholdConfig>, key: &str) -> Option<ThresholdConfig> {
    thresholds.get(key).copied().or_else(|| {
        key.split_once(':')
            .filter(|(prefix, _)| *prefix == QUEUE_WAITING_PREFIX)
            .and_then(|(prefix, _)| thresholds.get(prefix).copied())
    })
}

/// Per-metric alert state machine with cooldown and hourly notification cap.
///
/// A `warning -> critical` escalation skips the cooldown (it still counts against the
/// hourly cap); every other dispatch waits the cooldown out.
///
/// Not internally synchronised: callers serialise `evaluate` (the binary wraps the
/// engine in a mutex).
pub struct AlertEngine {
    thresholds: HashMap<String, ThresholdConfig>,
    settings: AlertSettings,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    recipients: Arc<dyn RecipientDirectory>,
    states: HashMap<String, AlertState>,
    hourly: HashMap<String, HourlyWindow>,
}

impl AlertEngine {
    pub fn new(
        settings: AlertSettings,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        recipients: Arc<dyn RecipientDirectory>,
    ) -> Self {
        Self {
            thresholds: default_thresholds(),
            settings,
            clock,
            notifier,
            recipients,
            states: HashMap::new(),
            hourly: HashMap::new(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HashMap<String, ThresholdConfig>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Advances every metric's state and dispatches whatever passed the gate.
    /// Returns the notifications that were attempted.
    #[instrument(skip(self, snapshot))]
    pub async fn evaluate(&mut self, snapshot: &HealthSnapshot) -> Vec<AlertNotification> {
        let now = self.clock.now();

        let pending: Vec<AlertNotification> = metric_readings(snapshot)
            .into_iter()
            .filter_map(|(key, value)| self.evaluate_metric(&key, value, now))
            .collect();

        self.dispatch(&pending).await;
        pending
    }

    fn evaluate_metric(&mut self, key: &str, value: f64, now: DateTime<Utc>) -> Option<AlertNotification> {
        let config = threshold_for(&self.thresholds, key)?;
        let state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| AlertState::new(now));

        if !config.is_breached(value) {
            if state.level == AlertLevel::Ok {
                state.consecutive_ok_checks = 0;
                return None;
            }

            state.consecutive_ok_checks += 1;
            if state.consecutive_ok_checks < self.settings.hysteresis_checks.max(1) {
                debug!(metric = key, clean_checks = state.consecutive_ok_checks, "Awaiting recovery");
                return None;
            }

            let previous = state.level;
            state.level = AlertLevel::Ok;
            state.since = now;
            state.notify_count = 0;
            state.consecutive_ok_checks = 0;

            info!(event = "alert.resolved", metric = key, value, previous = previous.as_str());
            // Recovery bypasses the cooldown and hourly cap.
            return Some(AlertNotification {
                metric_key: key.to_string(),
                event: AlertEvent::Resolved(previous),
                value,
                timestamp: now,
            });
        }

        state.consecutive_ok_checks = 0;
        let new_level = if config.is_critically_breached(value) {
            AlertLevel::Critical
        } else {
            AlertLevel::Warning
        };

        // Escalating warning -> critical is announced even inside the cooldown.
        let escalation = state.level == AlertLevel::Warning && new_level == AlertLevel::Critical;

        if state.level != new_level {
            match new_level {
                AlertLevel::Critical => error!(
                    event = "alert.triggered",
                    metric = key,
                    value,
                    from = state.level.as_str(),
                    "CRITICAL ALERT TRIGGERED"
                ),
                _ => warn!(
                    event = "alert.triggered",
                    metric = key,
                    value,
                    from = state.level.as_str(),
                    "WARNING ALERT"
                ),
            }
            state.level = new_level;
            state.since = now;
        }

        if !pass_gate(state, &mut self.hourly, &self.settings, key, now, escalation) {
            return None;
        }

        let event = match new_level {
            AlertLevel::Critical => AlertEvent::Critical,
            _ => AlertEvent::Warning,
        };

        Some(AlertNotification {
            metric_key: key.to_string(),
            event,
            value,
            timestamp: now,
        })
    }

    async fn dispatch(&self, pending: &[AlertNotification]) {
        if pending.is_empty() {
            return;
        }

        if !self.settings.delivery_enabled {
            for notification in pending {
                info!(
                    event = "alert.delivery_disabled",
                    metric = %notification.metric_key,
                    level = notification.event.label(),
                    value = notification.value,
                );
            }
            return;
        }

        let recipients = match self.recipients.alert_recipients().await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(event = "alert.query_recipients_failed", error = %e);
                Vec::new()
            }
        };

        if recipients.is_empty() {
            warn!(event = "alert.no_recipients", pending = pending.len());
            return;
        }

        for notification in pending {
            let message = NotificationMessage::for_alert(&self.settings.app_name, notification);
            match self
                .notifier
                .send(&recipients, &message.subject, &message.html, &message.text)
                .await
            {
                Ok(()) => info!(
                    event = "alert.sent",
                    metric = %notification.metric_key,
                    level = notification.event.label(),
                    recipient_count = recipients.len(),
                ),
                Err(e) => error!(
                    event = "alert.dispatch_failed",
                    metric = %notification.metric_key,
                    error = %e,
                ),
            }
        }
    }

    /// Copy of the per-metric states, for dashboards.
    pub fn alert_states(&self) -> HashMap<String, AlertState> {
        self.states.clone()
    }

    pub fn alert_state(&self, key: &str) -> Option<&AlertState> {
        self.states.get(key)
    }

    pub fn clear_states(&mut self) {
        self.states.clear();
        self.hourly.clear();
    }
}

/// Cooldown and hourly cap. Commits the counters only when the notification may go out.
fn pass_gate(
    state: &mut AlertState,
    hourly: &mut HashMap<String, HourlyWindow>,
    settings: &AlertSettings,
    key: &str,
    now: DateTime<Utc>,
    skip_cooldown: bool,
) -> bool {
    let cooldown = Duration::from_std(settings.cooldown).unwrap_or_else(|_| Duration::minutes(5));

    if let (Some(last), false) = (state.last_notified_at, skip_cooldown) {
        if now - last < cooldown {
            debug!(event = "alert.suppressed_cooldown", metric = key);
            return false;
        }
    }

    let window = hourly.entry(key.to_string()).or_insert(HourlyWindow {
        count: 0,
        window_started_at: now,
    });
    if now - window.window_started_at > Duration::hours(1) {
        window.count = 0;
        window.window_started_at = now;
    }
    if window.count >= settings.max_per_hour {
        debug!(event = "alert.suppressed_hourly_cap", metric = key, count = window.count);
        return false;
    }

    state.last_notified_at = Some(now);
    state.notify_count += 1;
    window.count += 1;
    true
}
