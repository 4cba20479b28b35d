use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::crawler::result::{FetchResult, FetchStatus};

/// Crawl metrics collector
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// Shared outcome counters for one engine
    metrics: Arc<Mutex<Metrics>>,
}

/// Snapshot of fetch outcomes
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Metrics {
    /// When counting began
    pub start_time: DateTime<Utc>,

    /// URLs processed
    pub total_requests: usize,

    pub successful_requests: usize,

    pub failed_requests: usize,

    /// URLs disallowed by robots.txt
    pub blocked_requests: usize,

    /// Results served from the cache
    pub cached_responses: usize,

    /// Browser pages opened, including retries. Filled in from the session
    /// manager when a snapshot is taken.
    pub pages_opened: usize,

    /// Sum of every result's load time
    pub total_load_time_ms: u64,
}

impl Metrics {
    /// Mean load time over all processed URLs
    pub fn average_load_time_ms(&self) -> u64 {
        if self.total_requests == 0 {
            0
        } else {
            self.total_load_time_ms / self.total_requests as u64
        }
    }
}

impl MetricsCollector {
    /// Empty collector, clock started now
    pub fn new() -> Self {
        let metrics = Metrics {
            start_time: Utc::now(),
            ..Default::default()
        };

        Self {
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    /// Record the outcome of one URL
    pub async fn record_result(&self, result: &FetchResult) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_requests += 1;
        metrics.total_load_time_ms += result.load_time_ms;

        match result.status {
            FetchStatus::Success => metrics.successful_requests += 1,
            FetchStatus::Failed => metrics.failed_requests += 1,
            FetchStatus::Blocked => metrics.blocked_requests += 1,
        }

        if result.cached {
            metrics.cached_responses += 1;
        }
    }

    /// Begin timing one fetch
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Get all metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock timer for one fetch
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_result_counts_by_status() {
        let collector = MetricsCollector::new();

        collector
            .record_result(&FetchResult::failed("https://a.example", "x", 100))
            .await;
        collector
            .record_result(&FetchResult::blocked("https://b.example", 5))
            .await;
        let cached = FetchResult::from_cache(
            FetchResult::failed("https://c.example", "x", 0),
            "https://c.example",
            15,
        );
        collector.record_result(&cached).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.failed_requests, 2);
        assert_eq!(metrics.blocked_requests, 1);
        assert_eq!(metrics.cached_responses, 1);
        assert_eq!(metrics.total_load_time_ms, 120);
        assert_eq!(metrics.average_load_time_ms(), 40);
    }

    #[test]
    fn test_timer_measures_elapsed() {
        let collector = MetricsCollector::new();
        let timer = collector.start_timer();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5);
    }
}
