use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MONITORED_QUEUES: &[&str] = &[
    "email-notification",
    "fraud-detection",
    "staff-import",
    "webhook-ingestion",
    "productivity-snapshot",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub app_version: String,
    pub app_env: String,
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub redis_url: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub alert_recipients: Vec<String>,
    pub monitoring: MonitoringSettings,
    pub alerts: AlertSettings,
}

/// Knobs for the sampling side: cache window, probe timeouts and which queues to watch.
#[derive(Debug, Clone)]
pub struct MonitoringSettings {
    pub cache_ttl: Duration,
    pub check_interval: Duration,
    pub probe_timeout: Duration,
    pub storage_mount_point: String,
    pub monitored_queues: Vec<String>,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(10),
            check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_millis(2000),
            storage_mount_point: "/".to_string(),
            monitored_queues: DEFAULT_MONITORED_QUEUES.iter().map(|q| q.to_string()).collect(),
        }
    }
}

/// Knobs for the alert state machine and its notification gate.
#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub cooldown: Duration,
    pub max_per_hour: u32,
    pub hysteresis_checks: u32,
    pub delivery_enabled: bool,
    pub app_name: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5 * 60),
            max_per_hour: 3,
            hysteresis_checks: 2,
            delivery_enabled: true,
            app_name: "Pulse".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "Pulse".to_string());
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| {
            warn!("APP_ENV not set, assuming development");
            "development".to_string()
        });
        let is_production = app_env == "production";

        let monitoring_defaults = MonitoringSettings::default();
        let monitoring = MonitoringSettings {
            cache_ttl: Duration::from_secs(parse_env("HEALTH_CACHE_TTL_SECS", 10)),
            check_interval: Duration::from_secs(parse_env("HEALTH_CHECK_INTERVAL_SECS", 60)),
            probe_timeout: Duration::from_millis(parse_env("HEALTH_PROBE_TIMEOUT_MS", 2000)),
            storage_mount_point: env::var("STORAGE_MOUNT_POINT")
                .unwrap_or(monitoring_defaults.storage_mount_point),
            monitored_queues: env::var("MONITORED_QUEUES")
                .map(|raw| split_list(&raw))
                .unwrap_or(monitoring_defaults.monitored_queues),
        };

        let alerts = AlertSettings {
            cooldown: Duration::from_secs(parse_env("ALERT_COOLDOWN_SECS", 300)),
            max_per_hour: parse_env("ALERT_MAX_PER_HOUR", 3),
            hysteresis_checks: parse_env("ALERT_HYSTERESIS_CHECKS", 2),
            delivery_enabled: parse_env("ALERT_DELIVERY_ENABLED", is_production),
            app_name: app_name.clone(),
        };

        let config = Self {
            app_name,
            app_version: env::var("APP_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            app_env,
            port: parse_env("PORT", 3000),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, admin lookups will use the anon key");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| {
                    warn!("REDIS_URL not set, using default");
                    "redis://localhost:6379".to_string()
                }),
            email_api_url: env::var("EMAIL_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com/emails".to_string()),
            email_api_key: env::var("EMAIL_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_API_KEY not set, alert emails will be rejected by the provider");
                    String::new()
                }),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "alerts@localhost".to_string()),
            alert_recipients: env::var("ALERT_RECIPIENTS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            monitoring,
            alerts,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.email_api_url.is_empty() && !self.email_api_key.is_empty()
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty_entries() {
        assert_eq!(
            split_list(" email-notification, ,staff-import ,"),
            vec!["email-notification".to_string(), "staff-import".to_string()]
        );
    }

    #[test]
    fn defaults_match_documented_constants() {
        let monitoring = MonitoringSettings::default();
        assert_eq!(monitoring.cache_ttl, Duration::from_secs(10));
        assert_eq!(monitoring.probe_timeout, Duration::from_secs(2));
        assert_eq!(monitoring.monitored_queues.len(), 5);

        let alerts = AlertSettings::default();
        assert_eq!(alerts.cooldown, Duration::from_secs(300));
        assert_eq!(alerts.max_per_hour, 3);
        assert_eq!(alerts.hysteresis_checks, 2);
    }

    #[test]
    fn parse_env_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_env("SHARED_CONFIG_TEST_GARBAGE", 42u64), 42);
        env::remove_var("SHARED_CONFIG_TEST_GARBAGE");
    }
}
