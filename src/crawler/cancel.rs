use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Cancels the crawls in flight when [`CancelHandle::cancel`] is called.
///
/// Every crawl runs under a child of the current generation token. Cancelling
/// fires that generation and starts a fresh one, so crawls started afterwards
/// run normally.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one crawl
    pub fn crawl_token(&self) -> CancellationToken {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }

    /// Cancel every crawl started before this call
    pub fn cancel(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        *current = CancellationToken::new();
    }
}

/// Run `fut` unless `token` fires first.
pub async fn guard<F, T>(token: &CancellationToken, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    if token.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    token
        .run_until_cancelled(fut)
        .await
        .unwrap_or(Err(FetchError::Cancelled))
}

/// Cancellable sleep.
pub async fn sleep(token: &CancellationToken, duration: Duration) -> Result<(), FetchError> {
    guard(token, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let handle = CancelHandle::new();
        let token = handle.crawl_token();

        let sleeper = tokio::spawn({
            let token = token.clone();
            async move { sleep(&token, Duration::from_secs(60)).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let res = tokio::time::timeout(Duration::from_secs(5), sleeper)
            .await
            .expect("sleep should be interrupted")
            .unwrap();
        assert_eq!(res, Err(FetchError::Cancelled));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_passes_through() {
        let token = CancellationToken::new();
        let res = guard(&token, async { Ok::<_, FetchError>(5) }).await;
        assert_eq!(res, Ok(5));
        assert_eq!(sleep(&token, Duration::from_millis(1)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_guard_short_circuits_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let res = guard(&token, async { Ok::<_, FetchError>(()) }).await;
        assert_eq!(res, Err(FetchError::Cancelled));
    }

    #[test]
    fn test_later_crawls_survive_cancel() {
        let handle = CancelHandle::new();
        let before = handle.crawl_token();

        handle.cancel();
        let after = handle.crawl_token();

        assert!(before.is_cancelled());
        assert!(!after.is_cancelled());

        handle.cancel();
        assert!(after.is_cancelled());
    }
}
