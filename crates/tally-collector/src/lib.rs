//! Metric sources for the tally agent.
//!
//! Each [`Collector`] samples one category of statistics and returns a flat
//! name → value map. [`collect_all`] runs a set of collectors and merges their
//! output into the snapshot the scheduler buffers between reports.

pub mod alloc;
pub mod host;
pub mod runtime;

use anyhow::Result;
use std::collections::HashMap;

pub use host::HostCollector;
pub use runtime::RuntimeCollector;

/// A metric source that runs inside the agent process.
///
/// Collectors are owned by a single worker and called once per poll tick.
/// The trait requires `Send + Sync` so worker tasks can run on any runtime
/// thread.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"runtime"`, `"host"`), used for logging.
    fn name(&self) -> &str;

    /// Samples current values, keyed by metric id.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<HashMap<String, f64>>;
}

/// The collectors every worker runs: runtime statistics first, then host statistics.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(RuntimeCollector::new()),
        Box::new(HostCollector::new()),
    ]
}

/// Runs every collector in order and merges the results.
///
/// Later collectors overwrite keys produced by earlier ones. A collector that
/// fails contributes nothing for this tick and does not stop the others.
pub fn collect_all(collectors: &mut [Box<dyn Collector>]) -> HashMap<String, f64> {
    let mut merged = HashMap::new();
    for collector in collectors.iter_mut() {
        match collector.collect() {
            Ok(values) => merged.extend(values),
            Err(e) => tracing::warn!(collector = collector.name(), error = %e, "Collection failed"),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Fixed(&'static str, Vec<(&'static str, f64)>);

    impl Collector for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn collect(&mut self) -> Result<HashMap<String, f64>> {
            Ok(self.1.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        }
    }

    struct Broken;

    impl Collector for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn collect(&mut self) -> Result<HashMap<String, f64>> {
            Err(anyhow!("sensor offline"))
        }
    }

    #[test]
    fn later_collector_wins_on_collision() {
        let mut collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(Fixed("first", vec![("Alloc", 1.0), ("Frees", 2.0)])),
            Box::new(Fixed("second", vec![("Alloc", 9.0)])),
        ];
        let merged = collect_all(&mut collectors);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["Alloc"], 9.0);
        assert_eq!(merged["Frees"], 2.0);
    }

    #[test]
    fn failing_collector_does_not_abort_others() {
        let mut collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(Broken),
            Box::new(Fixed("host", vec![("TotalMemory", 1024.0)])),
            Box::new(Broken),
        ];
        let merged = collect_all(&mut collectors);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["TotalMemory"], 1024.0);
    }

    #[test]
    fn default_collectors_cover_both_sources() {
        let mut collectors = default_collectors();
        let merged = collect_all(&mut collectors);
        assert!(merged.contains_key("RandomValue"));
        assert!(merged.contains_key("Alloc"));
        assert!(merged.contains_key("TotalMemory"));
    }
}
