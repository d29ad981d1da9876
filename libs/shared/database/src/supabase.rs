use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Role whose active members receive system alerts.
pub const ALERT_RECIPIENT_ROLE: &str = "super_admin";

#[derive(Debug, Deserialize)]
struct EmailRow {
    email: String,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_keys(
            &config.supabase_url,
            &config.supabase_anon_key,
            &config.supabase_service_role_key,
        )
    }

    pub fn with_keys(base_url: &str, anon_key: &str, service_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            service_key: service_key.to_string(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Privileged reads (user directory) need the service role; fall back to anon.
        let bearer = if self.service_key.is_empty() {
            &self.anon_key
        } else {
            &self.service_key
        };
        if !bearer.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", bearer))?,
            );
        }

        Ok(headers)
    }

    async fn send(&self, method: Method, path: &str) -> Result<reqwest::Response> {
        if self.base_url.is_empty() {
            return Err(anyhow!("Database URL is not configured"));
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let response = self.client
            .request(method, &url)
            .headers(self.get_headers()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        Ok(response)
    }

    pub async fn request<T>(&self, method: Method, path: &str) -> Result<T>
    where T: DeserializeOwned {
        let response = self.send(method, path).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Trivial liveness query: any successful response from the REST root counts.
    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.request(Method::GET, "/rest/v1/").await?;
        Ok(())
    }

    pub async fn active_admin_emails(&self) -> Result<Vec<String>> {
        let path = format!(
            "/rest/v1/users?select=email&role=eq.{}&status=eq.active",
            ALERT_RECIPIENT_ROLE
        );
        let rows: Vec<EmailRow> = self.request(Method::GET, &path).await?;

        Ok(rows.into_iter().map(|row| row.email).collect())
    }
}
