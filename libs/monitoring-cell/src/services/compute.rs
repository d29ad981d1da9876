// =====================================================================================
// COMPUTE LOAD SAMPLER
// =====================================================================================

use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::models::{ComputeUsage, MonitoringError};

/// Cumulative tick counters summed over every logical core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub idle: u64,
    pub cores: u32,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.busy + self.idle
    }
}

pub trait CpuTimesSource: Send + Sync {
    fn read(&self) -> Result<CpuTimes, MonitoringError>;
}

/// Reads `/proc/stat`. Busy time is user + nice + system + irq.
#[derive(Debug, Clone)]
pub struct ProcStatCpuTimes {
    path: String,
}

impl ProcStatCpuTimes {
    pub fn new() -> Self {
        Self { path: "/proc/stat".to_string() }
    }
}

impl Default for ProcStatCpuTimes {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTimesSource for ProcStatCpuTimes {
    fn read(&self) -> Result<CpuTimes, MonitoringError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| MonitoringError::ProbeFailed(format!("{}: {}", self.path, e)))?;
        parse_proc_stat(&content)
    }
}

pub fn parse_proc_stat(content: &str) -> Result<CpuTimes, MonitoringError> {
    let mut busy = 0u64;
    let mut idle = 0u64;
    let mut cores = 0u32;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };
        // Per-core lines only; the aggregate "cpu" line would double count.
        if !label.starts_with("cpu") || label.len() == 3 {
            continue;
        }

        let ticks: Vec<u64> = fields.map(|f| f.parse().unwrap_or(0)).collect();
        if ticks.len() < 4 {
            return Err(MonitoringError::ProbeFailed(format!("malformed cpu line: {}", line)));
        }
        let irq = ticks.get(5).copied().unwrap_or(0);

        busy += ticks[0] + ticks[1] + ticks[2] + irq;
        idle += ticks[3];
        cores += 1;
    }

    if cores == 0 {
        return Err(MonitoringError::ProbeFailed("no per-core cpu lines found".to_string()));
    }

    Ok(CpuTimes { busy, idle, cores })
}

/// Busy percentage over the interval since `previous`, or since boot without one.
pub fn usage_percent(previous: Option<&CpuTimes>, current: &CpuTimes) -> u32 {
    let (busy, total) = match previous {
        Some(prev) => (
            current.busy.saturating_sub(prev.busy),
            current.total().saturating_sub(prev.total()),
        ),
        None => (current.busy, current.total()),
    };

    if total == 0 {
        return 0;
    }

    let percent = ((busy as f64 / total as f64) * 100.0).round();
    percent.clamp(0.0, 100.0) as u32
}

pub struct CpuSampler {
    source: Arc<dyn CpuTimesSource>,
    previous: Mutex<Option<CpuTimes>>,
}

impl CpuSampler {
    pub fn new(source: Arc<dyn CpuTimesSource>) -> Self {
        Self {
            source,
            previous: Mutex::new(None),
        }
    }

    /// Reads the counters on the blocking pool; `/proc` reads are synchronous file I/O.
    pub async fn sample(&self) -> ComputeUsage {
        let source = self.source.clone();
        let reading = tokio::task::spawn_blocking(move || source.read())
            .await
            .unwrap_or_else(|e| Err(MonitoringError::ProbeFailed(format!("cpu reader task: {}", e))));

        let current = match reading {
            Ok(times) => times,
            Err(e) => {
                error!(event = "health.cpu_read_failed", error = %e, "CPU counters unavailable");
                return ComputeUsage { usage_percent: 0, cores: fallback_core_count() };
            }
        };

        let mut previous = self.previous.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let usage_percent = usage_percent(previous.as_ref(), &current);
        debug!(usage_percent, delta = previous.is_some(), "CPU sampled");
        *previous = Some(current);

        ComputeUsage { usage_percent, cores: current.cores.max(1) }
    }

    /// Forget the stored reading so the next sample reports since-boot usage again.
    pub fn reset_baseline(&self) {
        let mut previous = self.previous.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *previous = None;
    }
}

fn fallback_core_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}
