use crate::Collector;
use anyhow::{bail, Result};
use std::collections::HashMap;
use sysinfo::System;

/// Host memory and per-core CPU utilization.
///
/// Cores are reported as `CPUutilization1..N`. CPU usage is computed against
/// the previous refresh, so the first sample after construction reflects the
/// interval since `new()`.
pub struct HostCollector {
    system: System,
}

impl HostCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for HostCollector {
    fn name(&self) -> &str {
        "host"
    }

    fn collect(&mut self) -> Result<HashMap<String, f64>> {
        self.system.refresh_memory();
        self.system.refresh_cpu_all();

        let total = self.system.total_memory();
        if total == 0 {
            bail!("memory statistics unavailable");
        }

        let mut values = HashMap::new();
        values.insert("TotalMemory".to_string(), total as f64);
        values.insert(
            "FreeMemory".to_string(),
            self.system.available_memory() as f64,
        );

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            values.insert(format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64);
        }

        Ok(values)
    }
}
