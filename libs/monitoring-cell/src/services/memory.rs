// =====================================================================================
// MEMORY SAMPLER
// =====================================================================================

use std::sync::{Arc, Mutex};

use sysinfo::System;

use crate::models::MemoryUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

pub trait MemorySource: Send + Sync {
    fn read(&self) -> MemoryReading;
}

/// Physical memory via `sysinfo`; "free" is what the kernel reports as available.
pub struct SysinfoMemory {
    system: Mutex<System>,
}

impl SysinfoMemory {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }
}

impl Default for SysinfoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for SysinfoMemory {
    fn read(&self) -> MemoryReading {
        let mut system = self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_memory();

        MemoryReading {
            total_bytes: system.total_memory(),
            free_bytes: system.available_memory(),
        }
    }
}

pub struct MemorySampler {
    source: Arc<dyn MemorySource>,
}

impl MemorySampler {
    pub fn new(source: Arc<dyn MemorySource>) -> Self {
        Self { source }
    }

    pub fn sample(&self) -> MemoryUsage {
        let reading = self.source.read();
        MemoryUsage::from_bytes(reading.total_bytes, reading.free_bytes)
    }
}
