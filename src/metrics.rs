//! In-memory performance samples keyed by `"METHOD route"`.
//!
//! Samples are appended until [`MetricsStore::clear`] is called; there is no
//! other eviction, so long-running processes should clear periodically.
//! In-flight measurements are held by the caller as a [`SampleHandle`] and
//! are unaffected by a concurrent `clear`.
//!
//! # Examples
//!
//! ```
//! use handler_rail::metrics::MetricsStore;
//! use std::time::Duration;
//!
//! let store = MetricsStore::new(Duration::from_secs(1));
//! let handle = store.start("/users", "GET");
//! let sample = store.finish(handle);
//!
//! assert_eq!(sample.key(), "GET /users");
//! assert!(!sample.is_slow_operation());
//! assert_eq!(store.get(Some("/users")).len(), 1);
//!
//! store.clear();
//! assert!(store.get(None).is_empty());
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};

/// One finished measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    route: String,
    method: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    duration: Duration,
    memory_before: u64,
    memory_after: u64,
    is_slow_operation: bool,
}

impl PerformanceSample {
    /// Store key, `"METHOD route"`.
    pub fn key(&self) -> String {
        sample_key(&self.method, &self.route)
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Resident set size in bytes at start; 0 where unavailable.
    pub fn memory_before(&self) -> u64 {
        self.memory_before
    }

    pub fn memory_after(&self) -> u64 {
        self.memory_after
    }

    pub fn is_slow_operation(&self) -> bool {
        self.is_slow_operation
    }
}

/// An in-flight measurement; hand it back to [`MetricsStore::finish`].
#[must_use = "a sample is only recorded once finished"]
#[derive(Debug)]
pub struct SampleHandle {
    route: String,
    method: String,
    start_time: DateTime<Utc>,
    started: Instant,
    memory_before: u64,
}

impl SampleHandle {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Aggregate view of one route key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub key: String,
    pub count: usize,
    #[serde(rename = "meanMs", serialize_with = "serialize_millis")]
    pub mean: Duration,
    #[serde(rename = "maxMs", serialize_with = "serialize_millis")]
    pub max: Duration,
    pub slow_operations: usize,
}

/// Shared sample store with a slow-operation threshold.
#[derive(Debug)]
pub struct MetricsStore {
    samples: Mutex<BTreeMap<String, Vec<PerformanceSample>>>,
    threshold: Duration,
}

impl MetricsStore {
    pub fn new(threshold: Duration) -> Self {
        Self { samples: Mutex::new(BTreeMap::new()), threshold }
    }

    /// Operations strictly longer than this are flagged slow.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn start<R, M>(&self, route: R, method: M) -> SampleHandle
    where
        R: Into<String>,
        M: Into<String>,
    {
        SampleHandle {
            route: route.into(),
            method: method.into(),
            start_time: Utc::now(),
            started: Instant::now(),
            memory_before: resident_memory_bytes(),
        }
    }

    /// Finalizes `handle`, records the sample and returns a copy of it.
    pub fn finish(&self, handle: SampleHandle) -> PerformanceSample {
        let duration = handle.started.elapsed();
        let sample = PerformanceSample {
            route: handle.route,
            method: handle.method,
            start_time: handle.start_time,
            end_time: Utc::now(),
            duration,
            memory_before: handle.memory_before,
            memory_after: resident_memory_bytes(),
            is_slow_operation: duration > self.threshold,
        };

        if sample.is_slow_operation {
            tracing::debug!(
                route = %sample.route,
                method = %sample.method,
                duration_ms = duration.as_millis() as u64,
                "slow operation"
            );
        }

        self.samples.lock().entry(sample.key()).or_default().push(sample.clone());
        sample
    }

    /// All samples (by key, then insertion order), or those whose key or
    /// route equals `route`.
    pub fn get(&self, route: Option<&str>) -> Vec<PerformanceSample> {
        let samples = self.samples.lock();
        match route {
            None => samples.values().flatten().cloned().collect(),
            Some(filter) => samples
                .iter()
                .flat_map(|(key, list)| {
                    let whole_key = key == filter;
                    list.iter().filter(move |sample| whole_key || sample.route == filter)
                })
                .cloned()
                .collect(),
        }
    }

    pub fn summary(&self) -> Vec<RouteSummary> {
        self.samples
            .lock()
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(key, list)| {
                let total: Duration = list.iter().map(|s| s.duration).sum();
                RouteSummary {
                    key: key.clone(),
                    count: list.len(),
                    mean: total / list.len() as u32,
                    max: list.iter().map(|s| s.duration).max().unwrap_or_default(),
                    slow_operations: list.iter().filter(|s| s.is_slow_operation).count(),
                }
            })
            .collect()
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.samples.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every recorded sample.
    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

fn sample_key(method: &str, route: &str) -> String {
    format!("{} {}", method.to_uppercase(), route)
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Resident set size of this process in bytes.
///
/// Read from the `VmRSS` line of `/proc/self/status`, which the kernel
/// reports in KiB whatever the page size.
#[cfg(target_os = "linux")]
pub fn resident_memory_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_vm_rss(&status))
        .unwrap_or(0)
}

#[cfg(any(target_os = "linux", test))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(kib * 1024)
}

/// Resident set size of this process in bytes; unsupported here, always 0.
#[cfg(not(target_os = "linux"))]
pub fn resident_memory_bytes() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_rss_is_read_in_kib() {
        let status = "Name:\tworker\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(2048 * 1024));
        assert_eq!(parse_vm_rss("Name:\tworker\n"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn resident_memory_is_reported_on_linux() {
        assert!(resident_memory_bytes() > 0);
    }

    #[test]
    fn slow_flag_follows_threshold() {
        let store = MetricsStore::new(Duration::from_millis(5));
        let slow = store.start("/slow", "get");
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.finish(slow).is_slow_operation());

        let store = MetricsStore::new(Duration::from_secs(60));
        let fast = store.start("/fast", "GET");
        assert!(!store.finish(fast).is_slow_operation());
    }

    #[test]
    fn get_filters_by_route_or_key() {
        let store = MetricsStore::new(Duration::from_secs(1));
        for (route, method) in [("/a", "GET"), ("/a", "POST"), ("/b", "GET")] {
            let handle = store.start(route, method);
            store.finish(handle);
        }

        assert_eq!(store.get(None).len(), 3);
        assert_eq!(store.get(Some("/a")).len(), 2);
        assert_eq!(store.get(Some("POST /a")).len(), 1);
        assert!(store.get(Some("/missing")).is_empty());
    }

    #[test]
    fn clear_leaves_in_flight_samples_alone() {
        let store = MetricsStore::new(Duration::from_secs(1));
        let done = store.start("/a", "GET");
        store.finish(done);
        let in_flight = store.start("/a", "GET");

        store.clear();
        assert!(store.is_empty());

        store.finish(in_flight);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn summary_aggregates_per_key() {
        let store = MetricsStore::new(Duration::ZERO);
        for _ in 0..3 {
            let handle = store.start("/a", "GET");
            std::thread::sleep(Duration::from_millis(1));
            store.finish(handle);
        }

        let summary = store.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].key, "GET /a");
        assert_eq!(summary[0].count, 3);
        assert_eq!(summary[0].slow_operations, 3);
        assert!(summary[0].max >= summary[0].mean);
    }
}
