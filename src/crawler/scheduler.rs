use futures::future::join_all;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::browser::BehaviorSimulator;
use crate::crawler::result::FetchResult;
use crate::error::FetchError;

/// Runs a URL list in consecutive chunks of at most `max_concurrent` fetches
pub struct ChunkScheduler {
    /// Upper bound on fetches in flight
    max_concurrent: usize,

    /// Pause between chunks
    pacing: BehaviorSimulator,
}

impl ChunkScheduler {
    /// `max_concurrent` of 0 is treated as 1
    pub fn new(max_concurrent: usize, delay_range_ms: (u64, u64)) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            pacing: BehaviorSimulator::new(delay_range_ms),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Fetch every URL, returning results in input order.
    ///
    /// Each chunk runs to completion before the next starts. Once `cancel`
    /// fires no further chunk is started and the URLs that never ran are
    /// reported as cancelled failures.
    pub async fn run<F, Fut>(
        &self,
        urls: &[String],
        fetch: F,
        cancel: &CancellationToken,
    ) -> Vec<FetchResult>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = FetchResult>,
    {
        let chunk_count = urls.chunks(self.max_concurrent).len();
        let mut results = Vec::with_capacity(urls.len());

        for (index, chunk) in urls.chunks(self.max_concurrent).enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            info!(
                "Processing chunk {}/{} ({} URLs)",
                index + 1,
                chunk_count,
                chunk.len()
            );
            let chunk_results = join_all(chunk.iter().cloned().map(&fetch)).await;
            results.extend(chunk_results);

            if index + 1 < chunk_count && self.pacing.random_pause(cancel).await.is_err() {
                debug!("Pause between chunks interrupted by cancellation");
                break;
            }
        }

        let cancelled = FetchError::Cancelled.to_string();
        for url in &urls[results.len()..] {
            results.push(FetchResult::failed(url, &cancelled, 0));
        }

        results
    }
}
