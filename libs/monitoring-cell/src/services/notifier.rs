// =====================================================================================
// ALERT NOTIFICATION DELIVERY
// =====================================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error};

use crate::models::{AlertEvent, AlertNotification, MonitoringError};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<(), MonitoringError>;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// An empty list means nobody is on call, not an error.
    async fn alert_recipients(&self) -> Result<Vec<String>, MonitoringError>;
}

// -------------------------------------------------------------------------------------
// Email over an HTTP provider API
// -------------------------------------------------------------------------------------

pub struct EmailNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailNotifier {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.email_api_url, &config.email_api_key, &config.email_from)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<(), MonitoringError> {
        // One message per recipient so addresses are not disclosed to each other.
        for recipient in recipients {
            let payload = json!({
                "from": self.from,
                "to": [recipient],
                "subject": subject,
                "html": html_body,
                "text": text_body,
            });

            let response = self.client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await
                .map_err(|e| MonitoringError::NotificationFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                error!("Email API error ({}): {}", status, error_text);
                return Err(MonitoringError::NotificationFailed(format!(
                    "email provider returned {} for {}",
                    status, recipient
                )));
            }

            debug!("Alert email sent to {}", recipient);
        }

        Ok(())
    }
}

// -------------------------------------------------------------------------------------
// Recipients
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StaticRecipients {
    recipients: Vec<String>,
}

impl StaticRecipients {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl RecipientDirectory for StaticRecipients {
    async fn alert_recipients(&self) -> Result<Vec<String>, MonitoringError> {
        Ok(self.recipients.clone())
    }
}

/// Active super admins from the user directory.
pub struct SupabaseAdminDirectory {
    client: Arc<SupabaseClient>,
}

impl SupabaseAdminDirectory {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecipientDirectory for SupabaseAdminDirectory {
    async fn alert_recipients(&self) -> Result<Vec<String>, MonitoringError> {
        self.client
            .active_admin_emails()
            .await
            .map_err(|e| MonitoringError::RecipientLookup(e.to_string()))
    }
}

// -------------------------------------------------------------------------------------
// Formatting
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl NotificationMessage {
    pub fn for_alert(app_name: &str, alert: &AlertNotification) -> Self {
        let label = alert.event.label();
        let value = format_value(alert.value);
        let (color, status_text) = match alert.event {
            AlertEvent::Critical => ("#dc2626", "Critical".to_string()),
            AlertEvent::Warning => ("#f59e0b", "Warning".to_string()),
            AlertEvent::Resolved(previous) => {
                ("#22c55e", format!("Resolved (was {})", previous.as_str()))
            }
        };

        let subject = format!("[{}] {} system alert: {}", label, app_name, alert.metric_key);

        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="margin: 0 0 8px;">{app} System Health Alert</h2>
  <p style="margin: 0 0 16px; color: #6b7280; font-size: 14px;">{timestamp}</p>
  <table style="width: 100%; border-collapse: collapse;">
    <thead>
      <tr style="background: #f9fafb;">
        <th style="padding: 10px 12px; text-align: left;">Metric</th>
        <th style="padding: 10px 12px; text-align: left;">Level</th>
        <th style="padding: 10px 12px; text-align: left;">Value</th>
      </tr>
    </thead>
    <tbody>
      <tr>
        <td style="padding: 8px 12px;">{metric}</td>
        <td style="padding: 8px 12px;"><span style="background: {color}; color: white; padding: 2px 8px; border-radius: 4px;">{status}</span></td>
        <td style="padding: 8px 12px;">{value}</td>
      </tr>
    </tbody>
  </table>
  <p style="color: #6b7280; font-size: 14px;">Please check the <strong>System Health</strong> dashboard for full details.</p>
</div>"#,
            app = escape_html(app_name),
            timestamp = alert.timestamp.to_rfc3339(),
            metric = escape_html(&alert.metric_key),
            color = color,
            status = escape_html(&status_text),
            value = value,
        );

        let text = format!(
            "{} System Health Alert\n\n{}: {} = {}\n\nPlease check the System Health dashboard.",
            app_name, label, alert.metric_key, value
        );

        Self { subject, html, text }
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
