use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::browser::{BehaviorSimulator, BrowserPage, BrowserSessionManager, Fingerprint, PageSession};
use crate::cli::config::{FetchPolicy, ScrapeConfig, ScrapeOverrides};
use crate::crawler::cancel;
use crate::crawler::extractor::Document;
use crate::crawler::result::{FetchResult, PageCapture};
use crate::error::FetchError;
use crate::robots::RobotsChecker;
use crate::storage::CacheStore;
use crate::utils::MetricsCollector;

/// Per-URL fetch pipeline
///
/// cache lookup, then robots check, then up to `retry_attempts` browser
/// attempts, then cache write.
pub struct FetchController {
    config: Arc<ScrapeConfig>,
    cache: CacheStore,
    robots: RobotsChecker,
    sessions: Arc<BrowserSessionManager>,
    behavior: BehaviorSimulator,
    metrics: MetricsCollector,
}

impl FetchController {
    pub fn new(
        config: Arc<ScrapeConfig>,
        sessions: Arc<BrowserSessionManager>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            cache: CacheStore::new(&config.cache),
            robots: RobotsChecker::new(),
            behavior: BehaviorSimulator::new(config.scraper.delay_range_ms),
            config,
            sessions,
            metrics,
        }
    }

    /// Fetch one URL. Never fails: every outcome is a [`FetchResult`].
    ///
    /// Firing `cancel` aborts the current navigation or pause and ends the
    /// retry loop.
    pub async fn fetch(
        &self,
        url: &str,
        overrides: Option<&ScrapeOverrides>,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let result = self.run_pipeline(url, overrides, cancel).await;
        self.metrics.record_result(&result).await;
        result
    }

    async fn run_pipeline(
        &self,
        url: &str,
        overrides: Option<&ScrapeOverrides>,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let policy = self.config.policy(overrides);
        let timer = self.metrics.start_timer();

        if policy.use_cache {
            if let Some(cached) = self.cache.get(url).await {
                info!("Serving {} from cache", url);
                return FetchResult::from_cache(cached, url, timer.elapsed_ms());
            }
        }

        if policy.respect_robots_txt && !self.robots.is_allowed(url).await {
            warn!("{} is disallowed by robots.txt", url);
            return FetchResult::blocked(url, timer.elapsed_ms());
        }

        let mut last_error = FetchError::Cancelled;
        for attempt in 1..=policy.retry_attempts {
            debug!("Attempt {}/{} for {}", attempt, policy.retry_attempts, url);

            match self.attempt(url, &policy, cancel).await {
                Ok(capture) => {
                    let result = FetchResult::success(url, capture, timer.elapsed_ms());
                    info!("Scraped {} in {} ms", url, result.load_time_ms);
                    if policy.use_cache {
                        self.cache.put(url, &result).await;
                    }
                    return result;
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} for {} failed ({}): {}",
                        attempt,
                        policy.retry_attempts,
                        url,
                        e.kind(),
                        e
                    );
                    let retryable = e.is_retryable();
                    last_error = e;

                    if !retryable || attempt == policy.retry_attempts {
                        break;
                    }
                    if let Err(e) = self.behavior.random_pause(cancel).await {
                        last_error = e;
                        break;
                    }
                }
            }
        }

        error!("Giving up on {}: {}", url, last_error);
        FetchResult::failed(url, &last_error.to_string(), timer.elapsed_ms())
    }

    /// One complete browser attempt. The page is closed whatever happens.
    async fn attempt(
        &self,
        url: &str,
        policy: &FetchPolicy,
        cancel: &CancellationToken,
    ) -> Result<PageCapture, FetchError> {
        let PageSession {
            mut page,
            fingerprint,
        } = self.sessions.open_page(cancel).await?;

        let outcome = self
            .capture(page.as_mut(), url, fingerprint, policy, cancel)
            .await;
        BrowserSessionManager::close_page(page).await;
        outcome
    }

    async fn capture(
        &self,
        page: &mut dyn BrowserPage,
        url: &str,
        fingerprint: Fingerprint,
        policy: &FetchPolicy,
        cancel: &CancellationToken,
    ) -> Result<PageCapture, FetchError> {
        cancel::guard(cancel, page.goto(url, policy.timeout)).await?;
        self.behavior
            .simulate(page, fingerprint.viewport, cancel)
            .await?;

        // Let late scripts finish rendering
        cancel::sleep(cancel, policy.settle).await?;

        let html = cancel::guard(cancel, page.content()).await?;
        let document = Document::parse(&html, url);

        let content = document.extract_content()?;
        let related_pages = document.find_related_pages(url)?;
        let image_alt_texts = if policy.extract_image_alt {
            document.extract_image_alt_texts()?
        } else {
            Vec::new()
        };

        Ok(PageCapture {
            content,
            image_alt_texts,
            related_pages,
            user_agent: fingerprint.user_agent,
            viewport: fingerprint.viewport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeLauncher, FakeState};
    use crate::browser::{LaunchOptions, MockBrowserLauncher};
    use crate::crawler::result::FetchStatus;
    use crate::storage::cache::CacheEntry;
    use chrono::Utc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head><title>Shop</title>
        <meta name="description" content="Things for sale"></head>
        <body><main><h1>Welcome</h1><p>Hello</p></main>
        <a href="/about">About</a>
        <img src="/logo.png" alt="Logo"></body></html>"#;

    fn test_config(cache_dir: &TempDir) -> ScrapeConfig {
        let mut config = ScrapeConfig::default();
        config.scraper.delay_range_ms = (0, 0);
        config.scraper.settle_ms = 0;
        config.scraper.respect_robots_txt = false;
        config.cache.directory = cache_dir.path().to_path_buf();
        config
    }

    fn controller_with(
        config: ScrapeConfig,
        launcher: Arc<dyn crate::browser::BrowserLauncher>,
    ) -> FetchController {
        let sessions = Arc::new(BrowserSessionManager::new(
            launcher,
            LaunchOptions { headless: true },
            config.browser.viewport,
        ));
        FetchController::new(Arc::new(config), sessions, MetricsCollector::new())
    }

    /// Token nobody cancels
    fn live() -> CancellationToken {
        CancellationToken::new()
    }

    fn controller(config: ScrapeConfig, state: FakeState) -> (FetchController, Arc<FakeState>) {
        let (launcher, state) = FakeLauncher::new(state);
        (controller_with(config, launcher), state)
    }

    #[tokio::test]
    async fn test_successful_fetch_is_assembled() {
        let dir = TempDir::new().unwrap();
        let (controller, state) = controller(test_config(&dir), FakeState::new(PAGE));
        let url = "https://shop.example/";

        let result = controller.fetch(url, None, &live()).await;

        assert_eq!(result.status, FetchStatus::Success);
        assert!(!result.cached);
        let content = result.content.as_ref().unwrap();
        assert_eq!(content.title, "Shop");
        assert_eq!(content.meta_description, "Things for sale");
        assert_eq!(content.main_content, "WelcomeHello");
        assert_eq!(result.related_pages.len(), 1);
        assert_eq!(result.image_alt_texts[0].alt, "Logo");

        let notes = result.technical_notes.as_ref().unwrap();
        assert_eq!(notes.method, "browser-automation");
        assert!(notes.user_agent.is_some());
        assert!(notes.challenges.is_empty());

        assert_eq!(FakeState::count(&state.pages), 1);
        assert_eq!(FakeState::count(&state.active), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_browser() {
        let dir = TempDir::new().unwrap();
        let (controller, state) = controller(test_config(&dir), FakeState::new(PAGE));
        let url = "https://shop.example/";

        let first = controller.fetch(url, None, &live()).await;
        let second = controller.fetch(url, None, &live()).await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.content, second.content);
        assert_eq!(FakeState::count(&state.pages), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_keeps_requested_spelling() {
        let dir = TempDir::new().unwrap();
        let (controller, state) = controller(test_config(&dir), FakeState::new(PAGE));

        let first = controller.fetch("https://Shop.example/", None, &live()).await;
        let second = controller.fetch("https://shop.example", None, &live()).await;
        let third = controller
            .fetch("https://shop.example/#pricing", None, &live())
            .await;

        assert_eq!(first.url, "https://Shop.example/");
        assert!(second.cached);
        assert_eq!(second.url, "https://shop.example");
        assert!(third.cached);
        assert_eq!(third.url, "https://shop.example/#pricing");
        assert_eq!(FakeState::count(&state.pages), 1);
    }

    #[tokio::test]
    async fn test_cache_bypassed_by_override() {
        let dir = TempDir::new().unwrap();
        let (controller, state) = controller(test_config(&dir), FakeState::new(PAGE));
        let url = "https://shop.example/";
        let no_cache = ScrapeOverrides {
            use_cache: Some(false),
            ..Default::default()
        };

        controller.fetch(url, None, &live()).await;
        let again = controller.fetch(url, Some(&no_cache), &live()).await;

        assert!(!again.cached);
        assert_eq!(FakeState::count(&state.pages), 2);
    }

    #[tokio::test]
    async fn test_expired_cache_entry_refetches() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let cache = CacheStore::new(&config.cache);
        let url = "https://shop.example/";

        // An entry written two days ago
        let stale = CacheEntry {
            url: url.to_string(),
            data: FetchResult::failed(url, "old", 1),
            timestamp_ms: Utc::now().timestamp_millis() - 2 * 86_400_000,
        };
        std::fs::write(
            dir.path()
                .join(format!("{}.json", crate::storage::cache::cache_key(url))),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();
        assert!(cache.get(url).await.is_none());

        let (controller, state) = controller(config, FakeState::new(PAGE));
        let result = controller.fetch(url, None, &live()).await;

        assert!(!result.cached);
        assert_eq!(result.status, FetchStatus::Success);
        assert_eq!(FakeState::count(&state.pages), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_keeps_last_error() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.scraper.retry_attempts = 3;
        let (controller, state) =
            controller(config, FakeState::new(PAGE).failing("shop.example"));

        let result = controller.fetch("https://shop.example/", None, &live()).await;

        assert_eq!(result.status, FetchStatus::Failed);
        assert_eq!(FakeState::count(&state.gotos), 3);
        assert_eq!(
            result.error.as_deref(),
            Some("Navigation failed: net::ERR_CONNECTION_REFUSED (navigation 3)")
        );
        let notes = result.technical_notes.unwrap();
        assert_eq!(notes.challenges, vec![result.error.clone().unwrap()]);
        assert_eq!(notes.recommendations.len(), 3);
        // Every page closed, failures are not cached
        assert_eq!(FakeState::count(&state.active), 0);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_retry_override() {
        let dir = TempDir::new().unwrap();
        let (controller, state) =
            controller(test_config(&dir), FakeState::new(PAGE).failing("shop.example"));
        let once = ScrapeOverrides {
            retry_attempts: Some(1),
            ..Default::default()
        };

        controller.fetch("https://shop.example/", Some(&once), &live()).await;
        assert_eq!(FakeState::count(&state.gotos), 1);
    }

    #[tokio::test]
    async fn test_robots_block_never_touches_browser() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.scraper.respect_robots_txt = true;

        let mut launcher = MockBrowserLauncher::new();
        launcher.expect_launch().never();
        let controller = controller_with(config, Arc::new(launcher));

        let result = controller
            .fetch(&format!("{}/private/page", server.uri()), None, &live())
            .await;

        assert_eq!(result.status, FetchStatus::Blocked);
        assert_eq!(result.error.as_deref(), Some("Access blocked by robots.txt"));
        assert!(result.content.is_none());
        assert!(result.technical_notes.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_retries() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.scraper.retry_attempts = 5;
        config.scraper.delay_range_ms = (60_000, 60_000);

        let (launcher, state) = FakeLauncher::new(FakeState::new(PAGE).failing("shop.example"));
        let token = CancellationToken::new();
        let controller = controller_with(config, launcher);

        let fetch = controller.fetch("https://shop.example/", None, &token);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        };
        let (result, ()) = tokio::join!(fetch, cancel);

        assert_eq!(result.status, FetchStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("Crawl cancelled"));
        assert_eq!(state.gotos.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_alt_text_extraction_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.scraper.extract_image_alt = false;
        let (controller, _state) = controller(config, FakeState::new(PAGE));

        let result = controller.fetch("https://shop.example/", None, &live()).await;
        assert!(result.is_success());
        assert!(result.image_alt_texts.is_empty());
    }
}
