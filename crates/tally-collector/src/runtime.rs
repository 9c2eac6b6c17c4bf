use crate::alloc;
use crate::Collector;
use anyhow::Result;
use rand::Rng;
use std::collections::HashMap;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Allocator counters, own-process statistics and a random jitter value.
pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "Process statistics unavailable");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<HashMap<String, f64>> {
        let mut values = HashMap::new();

        let stats = alloc::stats();
        values.insert("Alloc".to_string(), stats.live_bytes as f64);
        values.insert("TotalAlloc".to_string(), stats.total_bytes as f64);
        values.insert("Mallocs".to_string(), stats.allocations as f64);
        values.insert("Frees".to_string(), stats.deallocations as f64);
        values.insert("HeapObjects".to_string(), stats.live_objects() as f64);

        if let Some(pid) = self.pid {
            self.system
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = self.system.process(pid) {
                values.insert("ProcessResident".to_string(), process.memory() as f64);
                values.insert("ProcessVirtual".to_string(), process.virtual_memory() as f64);
                values.insert("ProcessCpuUsage".to_string(), process.cpu_usage() as f64);
            }
        }

        values.insert("RandomValue".to_string(), rand::thread_rng().gen::<f64>());

        Ok(values)
    }
}
