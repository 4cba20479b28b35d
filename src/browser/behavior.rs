use rand::{thread_rng, Rng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::browser::{BrowserPage, Viewport};
use crate::crawler::cancel;
use crate::error::FetchError;

/// Scroll distance bounds in pixels
pub const SCROLL_RANGE: (u32, u32) = (100, 600);

/// Human-like behavior simulator for browser automation
#[derive(Debug, Clone)]
pub struct BehaviorSimulator {
    /// Min and max pause in milliseconds
    delay_range_ms: (u64, u64),
}

/// Uniform integer delay in `[min, max]` milliseconds.
pub fn sample_delay<R: Rng + ?Sized>(rng: &mut R, range: (u64, u64)) -> Duration {
    let (min, max) = range;
    if min >= max {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rng.gen_range(min..=max))
}

pub fn scroll_offset<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(SCROLL_RANGE.0..=SCROLL_RANGE.1)
}

/// Random pointer target inside the viewport.
pub fn mouse_target<R: Rng + ?Sized>(rng: &mut R, viewport: Viewport) -> (u32, u32) {
    (
        rng.gen_range(0..viewport.width.max(1)),
        rng.gen_range(0..viewport.height.max(1)),
    )
}

impl BehaviorSimulator {
    pub fn new(delay_range_ms: (u64, u64)) -> Self {
        Self { delay_range_ms }
    }

    /// Sample a pause from the configured range
    pub fn next_delay(&self) -> Duration {
        sample_delay(&mut thread_rng(), self.delay_range_ms)
    }

    /// Pause for a random delay, aborting early on cancellation
    pub async fn random_pause(&self, cancel: &CancellationToken) -> Result<(), FetchError> {
        let delay = self.next_delay();
        debug!("Pausing for {} ms", delay.as_millis());
        cancel::sleep(cancel, delay).await
    }

    /// Scroll, pause, move the pointer, pause.
    pub async fn simulate(
        &self,
        page: &mut dyn BrowserPage,
        viewport: Viewport,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        let distance = scroll_offset(&mut thread_rng());
        page.evaluate(&format!("window.scrollBy(0, {});", distance))
            .await?;
        debug!("Scrolled {} pixels", distance);

        self.random_pause(cancel).await?;

        let (x, y) = mouse_target(&mut thread_rng(), viewport);
        page.mouse_move(x, y).await?;
        debug!("Moved pointer to ({}, {})", x, y);

        self.random_pause(cancel).await
    }
}
