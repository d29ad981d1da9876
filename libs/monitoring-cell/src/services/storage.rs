// =====================================================================================
// STORAGE SAMPLER
// =====================================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::models::{MonitoringError, StorageUsage};

#[async_trait]
pub trait StorageProbe: Send + Sync {
    async fn query(&self) -> Result<StorageUsage, MonitoringError>;
}

/// Shells out to `df -BG <mount>`.
#[derive(Debug, Clone)]
pub struct DfStorageProbe {
    mount_point: String,
}

impl DfStorageProbe {
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self { mount_point: mount_point.into() }
    }
}

#[async_trait]
impl StorageProbe for DfStorageProbe {
    async fn query(&self) -> Result<StorageUsage, MonitoringError> {
        let output = Command::new("df")
            .arg("-BG")
            .arg(&self.mount_point)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MonitoringError::ProbeFailed(format!("df: {}", e)))?;

        if !output.status.success() {
            return Err(MonitoringError::ProbeFailed(format!(
                "df exited with {}",
                output.status
            )));
        }

        parse_df_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses the last line of `df -BG`: `filesystem total used available use% mount`.
pub fn parse_df_output(stdout: &str) -> Result<StorageUsage, MonitoringError> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| MonitoringError::ProbeFailed("empty df output".to_string()))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(MonitoringError::ProbeFailed(format!("unexpected df line: {}", line)));
    }

    let number = |field: &str| -> u64 {
        field.trim_end_matches(['G', '%']).parse().unwrap_or(0)
    };

    Ok(StorageUsage {
        total_gb: number(parts[1]),
        used_gb: number(parts[2]),
        usage_percent: number(parts[4]).min(100) as u32,
    })
}

/// Best-effort: any failure or timeout becomes the all-zero reading.
pub struct StorageSampler {
    probe: Arc<dyn StorageProbe>,
    timeout: Duration,
}

impl StorageSampler {
    pub fn new(probe: Arc<dyn StorageProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    pub async fn sample(&self) -> StorageUsage {
        match tokio::time::timeout(self.timeout, self.probe.query()).await {
            Ok(Ok(usage)) => usage,
            Ok(Err(e)) => {
                warn!(event = "health.storage_query_failed", error = %e);
                StorageUsage::unknown()
            }
            Err(_) => {
                warn!(
                    event = "health.storage_query_failed",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "disk usage query timed out"
                );
                StorageUsage::unknown()
            }
        }
    }
}
