use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cli::config::ScrapeConfig;
use crate::cli::ScrapeArgs;
use crate::crawler::engine::{ExportOutput, ScraperEngine};
use crate::crawler::result::{FetchResult, FetchStatus};
use crate::export::ExportFormat;
use crate::utils::url::is_http_url;

/// `--delay` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

/// Parse `min-max` milliseconds
pub fn parse_delay_range(value: &str) -> Result<DelayRange, String> {
    let pattern = Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").map_err(|e| e.to_string())?;
    let caps = pattern
        .captures(value)
        .ok_or_else(|| format!("expected <min>-<max> in milliseconds, got '{}'", value))?;

    let min: u64 = caps[1].parse().map_err(|e| format!("invalid minimum: {}", e))?;
    let max: u64 = caps[2].parse().map_err(|e| format!("invalid maximum: {}", e))?;
    if min > max {
        return Err(format!("minimum {} exceeds maximum {}", min, max));
    }

    Ok(DelayRange { min, max })
}

/// Scrape a single URL
pub async fn scrape(url: String, options: ScrapeArgs) -> Result<()> {
    if !is_http_url(&url) {
        bail!("Not an http(s) URL: {}", url);
    }
    run(vec![url], options).await
}

/// Scrape every URL listed in a file
pub async fn batch(file: PathBuf, options: ScrapeArgs) -> Result<()> {
    let urls = read_url_file(&file)?;
    info!("Loaded {} URLs from {}", urls.len(), file.display());
    run(urls, options).await
}

/// Scrape URLs given as arguments
pub async fn list(urls: Vec<String>, options: ScrapeArgs) -> Result<()> {
    let urls = valid_urls(urls.iter().map(String::as_str));
    if urls.is_empty() {
        bail!("No valid URLs provided");
    }
    run(urls, options).await
}

/// Write the default configuration file
pub fn init_config() -> Result<()> {
    let path = ScrapeConfig::default()
        .save_as_default()
        .context("Failed to write default configuration")?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}

/// List all available configuration profiles
pub fn list_profiles() -> Result<()> {
    let profiles = ScrapeConfig::list_profiles().context("Failed to list profiles")?;

    println!("Available configuration profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Show the effective configuration
pub fn show_config(config: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config.as_deref(), profile.as_deref())?;
    let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;

    println!("Current configuration:");
    println!("{}", yaml);

    Ok(())
}

fn load_config(path: Option<&Path>, profile: Option<&str>) -> Result<ScrapeConfig> {
    match (path, profile) {
        (Some(path), _) => ScrapeConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display())),
        (None, Some(profile)) => ScrapeConfig::load_profile(profile)
            .with_context(|| format!("Failed to load profile: {}", profile)),
        (None, None) => ScrapeConfig::load_default().context("Failed to load default configuration"),
    }
}

/// Fold command line flags into the loaded configuration
fn apply_overrides(config: &mut ScrapeConfig, options: &ScrapeArgs) {
    if let Some(headless) = options.headless {
        config.browser.headless = headless;
    }
    if let Some(timeout) = options.timeout {
        config.browser.timeout_ms = timeout;
    }
    if let Some(retries) = options.retries {
        config.scraper.retry_attempts = retries;
    }
    if let Some(delay) = options.delay {
        config.scraper.delay_range_ms = (delay.min, delay.max);
    }
    if let Some(concurrent) = options.concurrent {
        config.scraper.max_concurrent = concurrent.max(1);
    }
    if options.no_cache {
        config.cache.enabled = false;
    }
    if options.no_robots {
        config.scraper.respect_robots_txt = false;
    }
    if options.no_alt_text {
        config.scraper.extract_image_alt = false;
    }
}

fn valid_urls<'a>(candidates: impl Iterator<Item = &'a str>) -> Vec<String> {
    candidates
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|candidate| {
            if is_http_url(candidate) {
                Some(candidate.to_string())
            } else {
                warn!("Skipping invalid URL: {}", candidate);
                None
            }
        })
        .collect()
}

fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL file: {}", path.display()))?;

    let urls = valid_urls(contents.lines());
    if urls.is_empty() {
        bail!("No valid URLs found in {}", path.display());
    }
    Ok(urls)
}

async fn run(urls: Vec<String>, options: ScrapeArgs) -> Result<()> {
    let format: ExportFormat = options.format.parse()?;

    let mut config = load_config(options.config.as_deref(), options.profile.as_deref())?;
    apply_overrides(&mut config, &options);

    let engine = ScraperEngine::new(config).context("Invalid configuration")?;

    let cancel = engine.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling crawl");
            cancel.cancel();
        }
    });

    let started = Instant::now();
    let results = if urls.len() == 1 {
        vec![engine.scrape_one(&urls[0], None).await]
    } else {
        engine.scrape_many(&urls, None).await
    };
    let elapsed = started.elapsed();

    let metrics = engine.metrics().await;
    info!(
        "Opened {} pages, average load time {} ms",
        metrics.pages_opened,
        metrics.average_load_time_ms()
    );

    let exported = engine
        .export(&results, format, options.output.as_deref())
        .await;

    engine.shutdown().await;
    ctrl_c.abort();

    match exported.context("Failed to export results")? {
        ExportOutput::Inline(text) => println!("{}", text),
        ExportOutput::Written(path) => info!("Results saved to {}", path.display()),
    }

    eprintln!("{}", Summary::from_results(&results, elapsed));
    Ok(())
}

/// End-of-run counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cached: usize,
    pub elapsed: Duration,
}

impl Summary {
    pub fn from_results(results: &[FetchResult], elapsed: Duration) -> Self {
        let count = |status: FetchStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            successful: count(FetchStatus::Success),
            failed: count(FetchStatus::Failed),
            blocked: count(FetchStatus::Blocked),
            cached: results.iter().filter(|r| r.cached).count(),
            elapsed,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scraping summary:")?;
        writeln!(f, "  Successful: {}/{}", self.successful, self.total)?;
        writeln!(f, "  Failed:     {}", self.failed)?;
        writeln!(f, "  Blocked:    {}", self.blocked)?;
        writeln!(f, "  Cached:     {}", self.cached)?;
        write!(f, "  Total time: {:.1}s", self.elapsed.as_secs_f64())
    }
}
