use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::browser::{BrowserLauncher, BrowserSessionManager, LaunchOptions, WebDriverLauncher};
use crate::cli::config::{ScrapeConfig, ScrapeOverrides};
use crate::crawler::cancel::CancelHandle;
use crate::crawler::controller::FetchController;
use crate::crawler::result::FetchResult;
use crate::crawler::scheduler::ChunkScheduler;
use crate::error::{ConfigError, ExportError};
use crate::export::{export_results, write_export, ExportFormat};
use crate::utils::{Metrics, MetricsCollector};

/// Where an export ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutput {
    Inline(String),
    Written(PathBuf),
}

/// Entry point for callers: scrape, export, shut down.
pub struct ScraperEngine {
    config: Arc<ScrapeConfig>,
    sessions: Arc<BrowserSessionManager>,
    controller: Arc<FetchController>,
    cancel: CancelHandle,
    metrics: MetricsCollector,
}

impl ScraperEngine {
    /// Build an engine backed by WebDriver
    pub fn new(config: ScrapeConfig) -> Result<Self, ConfigError> {
        let launcher = Arc::new(WebDriverLauncher::new(config.browser.clone()));
        Self::with_launcher(config, launcher)
    }

    /// Build an engine around any browser backend
    pub fn with_launcher(
        config: ScrapeConfig,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let config = Arc::new(config);
        let sessions = Arc::new(BrowserSessionManager::new(
            launcher,
            LaunchOptions {
                headless: config.browser.headless,
            },
            config.browser.viewport,
        ));
        let metrics = MetricsCollector::new();
        let controller = Arc::new(FetchController::new(
            Arc::clone(&config),
            Arc::clone(&sessions),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            sessions,
            controller,
            cancel: CancelHandle::new(),
            metrics,
        })
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Scrape a single URL
    pub async fn scrape_one(&self, url: &str, overrides: Option<&ScrapeOverrides>) -> FetchResult {
        let token = self.cancel.crawl_token();
        self.controller.fetch(url, overrides, &token).await
    }

    /// Scrape many URLs in bounded chunks; results follow input order
    pub async fn scrape_many(&self, urls: &[String], max_concurrent: Option<usize>) -> Vec<FetchResult> {
        let max_concurrent = max_concurrent.unwrap_or(self.config.scraper.max_concurrent);
        let scheduler = ChunkScheduler::new(max_concurrent, self.config.scraper.delay_range_ms);

        info!(
            "Scraping {} URLs with up to {} concurrent fetches",
            urls.len(),
            scheduler.max_concurrent()
        );

        let token = self.cancel.crawl_token();
        let controller = &self.controller;
        let crawl = &token;
        scheduler
            .run(
                urls,
                |url| async move { controller.fetch(&url, None, crawl).await },
                &token,
            )
            .await
    }

    /// Render results, inline or into `output`
    pub async fn export(
        &self,
        results: &[FetchResult],
        format: ExportFormat,
        output: Option<&Path>,
    ) -> Result<ExportOutput, ExportError> {
        match output {
            Some(path) => Ok(ExportOutput::Written(
                write_export(results, format, path).await?,
            )),
            None => Ok(ExportOutput::Inline(export_results(results, format)?)),
        }
    }

    /// Handle that aborts the crawls running when it fires. Crawls started
    /// afterwards are unaffected.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn metrics(&self) -> Metrics {
        let mut metrics = self.metrics.get_metrics().await;
        metrics.pages_opened = self.sessions.pages_opened();
        metrics
    }

    /// Release the shared browser. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
    }
}
