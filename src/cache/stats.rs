//! Per-asset-class request statistics
//!
//! Counters are updated once per terminal request outcome. Updates go
//! through a mutex so the running average and its sample count never
//! disagree; readers take a cheap snapshot.

use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Terminal outcome of one proxy request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from a fresh cache entry
    Hit,
    /// Origin answered 304, cached bytes served
    RevalidatedHit,
    /// Origin answered 200, new bytes stored and served
    Miss,
    /// Typed error returned to the caller
    Error,
}

/// Snapshot of one class's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub requests: u64,
    pub errors: u64,
    /// Fresh hits plus revalidated hits
    pub cache_hits: u64,
    pub revalidated_hits: u64,
    pub misses: u64,
    /// Bytes served to clients
    pub total_bytes: u64,
    pub avg_response_time_ms: f64,
}

impl StatsSnapshot {
    /// Cache hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / self.requests as f64) * 100.0
        }
    }
}

/// Request statistics owned by one proxy handler
#[derive(Debug, Default)]
pub struct RequestStats {
    inner: Mutex<StatsSnapshot>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal outcome with its response time and served size
    pub fn record(&self, outcome: Outcome, elapsed: Duration, bytes_served: usize) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        s.requests += 1;
        match outcome {
            Outcome::Hit => s.cache_hits += 1,
            Outcome::RevalidatedHit => {
                s.cache_hits += 1;
                s.revalidated_hits += 1;
            }
            Outcome::Miss => s.misses += 1,
            Outcome::Error => s.errors += 1,
        }
        s.total_bytes += bytes_served as u64;

        let n = s.requests as f64;
        s.avg_response_time_ms = (s.avg_response_time_ms * (n - 1.0) + sample) / n;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let stats = RequestStats::new();
        stats.record(Outcome::Miss, Duration::from_millis(30), 10);
        stats.record(Outcome::Hit, Duration::from_millis(10), 10);
        stats.record(Outcome::Hit, Duration::from_millis(20), 10);

        let s = stats.snapshot();
        assert_eq!(s.requests, 3);
        assert!((s.avg_response_time_ms - 20.0).abs() < 1e-9);
        assert_eq!(s.total_bytes, 30);
    }

    #[test]
    fn test_outcome_counters() {
        let stats = RequestStats::new();
        stats.record(Outcome::Hit, Duration::ZERO, 1);
        stats.record(Outcome::RevalidatedHit, Duration::ZERO, 1);
        stats.record(Outcome::Miss, Duration::ZERO, 1);
        stats.record(Outcome::Error, Duration::ZERO, 0);

        let s = stats.snapshot();
        assert_eq!(s.cache_hits, 2);
        assert_eq!(s.revalidated_hits, 1);
        assert_eq!(s.misses, 1);
        assert_eq!(s.errors, 1);
        assert!(s.requests >= s.cache_hits + s.errors);
        assert!((s.hit_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_updates_not_lost() {
        let stats = std::sync::Arc::new(RequestStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = std::sync::Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record(Outcome::Hit, Duration::from_millis(1), 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let s = stats.snapshot();
        assert_eq!(s.requests, 1000);
        assert_eq!(s.cache_hits, 1000);
        assert!(s.avg_response_time_ms >= 0.0);
    }

    #[test]
    fn test_empty_snapshot() {
        let s = RequestStats::new().snapshot();
        assert_eq!(s, StatsSnapshot::default());
        assert_eq!(s.hit_rate(), 0.0);
    }
}
