use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeConfig {
    pub browser: BrowserSettings,
    pub scraper: ScraperSettings,
    pub cache: CacheSettings,
}

/// Browser launch and fingerprint settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Page-load timeout in milliseconds
    pub timeout_ms: u64,
    /// Connect to an already running WebDriver server instead of spawning one
    pub webdriver_url: Option<String>,
    pub driver_path: String,
    pub driver_port: u16,
    pub driver_startup_timeout_ms: u64,
    pub viewport: ViewportRange,
}

/// Inclusive bounds for randomized viewports
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ViewportRange {
    pub width: (u32, u32),
    pub height: (u32, u32),
}

/// Fetch pipeline settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScraperSettings {
    pub retry_attempts: u32,
    pub delay_range_ms: (u64, u64), // Min and max delay in milliseconds
    /// Pause after behavior simulation so late scripts can render
    pub settle_ms: u64,
    pub respect_robots_txt: bool,
    pub extract_image_alt: bool,
    pub max_concurrent: usize,
}

/// Result cache settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub ttl_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_ms: 30_000,
            webdriver_url: None,
            driver_path: "chromedriver".to_string(),
            driver_port: 9515,
            driver_startup_timeout_ms: 10_000,
            viewport: ViewportRange::default(),
        }
    }
}

impl Default for ViewportRange {
    fn default() -> Self {
        Self {
            width: (1200, 1920),
            height: (800, 1080),
        }
    }
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            delay_range_ms: (1000, 3000),
            settle_ms: 2000,
            respect_robots_txt: true,
            extract_image_alt: true,
            max_concurrent: 3,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("./cache"),
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Per-call adjustments applied on top of the engine configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeOverrides {
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub respect_robots_txt: Option<bool>,
    pub extract_image_alt: Option<bool>,
    pub use_cache: Option<bool>,
    pub settle_ms: Option<u64>,
}

/// Effective settings for one fetch, after overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub respect_robots_txt: bool,
    pub extract_image_alt: bool,
    pub use_cache: bool,
    pub settle: Duration,
    pub delay_range_ms: (u64, u64),
}

impl ScrapeConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.scraper.retry_attempts == 0 {
            return invalid("scraper.retry_attempts must be at least 1");
        }
        if self.scraper.max_concurrent == 0 {
            return invalid("scraper.max_concurrent must be at least 1");
        }
        if self.browser.timeout_ms == 0 {
            return invalid("browser.timeout_ms must be greater than 0");
        }
        let (min_delay, max_delay) = self.scraper.delay_range_ms;
        if min_delay > max_delay {
            return invalid("scraper.delay_range_ms minimum exceeds maximum");
        }
        let viewport = &self.browser.viewport;
        if viewport.width.0 == 0 || viewport.height.0 == 0 {
            return invalid("browser.viewport bounds must be positive");
        }
        if viewport.width.0 > viewport.width.1 || viewport.height.0 > viewport.height.1 {
            return invalid("browser.viewport minimum exceeds maximum");
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return invalid("cache.ttl_secs must be greater than 0");
        }

        Ok(())
    }

    /// Resolve the settings used for one fetch.
    pub fn policy(&self, overrides: Option<&ScrapeOverrides>) -> FetchPolicy {
        let o = overrides.cloned().unwrap_or_default();

        FetchPolicy {
            timeout: Duration::from_millis(o.timeout_ms.unwrap_or(self.browser.timeout_ms)),
            retry_attempts: o.retry_attempts.unwrap_or(self.scraper.retry_attempts).max(1),
            respect_robots_txt: o
                .respect_robots_txt
                .unwrap_or(self.scraper.respect_robots_txt),
            extract_image_alt: o.extract_image_alt.unwrap_or(self.scraper.extract_image_alt),
            use_cache: self.cache.enabled && o.use_cache.unwrap_or(true),
            settle: Duration::from_millis(o.settle_ms.unwrap_or(self.scraper.settle_ms)),
            delay_range_ms: self.scraper.delay_range_ms,
        }
    }

    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let mut path = if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "smart-scraper", "smart-scraper")
        {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        // Create the profiles directory if it doesn't exist
        path.push("profiles");
        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path.pop();
        path
    }

    /// Load the default configuration, creating it on first use
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load a named configuration profile
    pub fn load_profile(profile: &str) -> Result<Self, ConfigError> {
        let profile_path = Self::config_dir()
            .join("profiles")
            .join(format!("{}.yaml", profile));

        Self::load_from_file(&profile_path)
    }

    /// Names of the saved profiles, sorted
    pub fn list_profiles() -> Result<Vec<String>, ConfigError> {
        let profiles_dir = Self::config_dir().join("profiles");
        let entries = fs::read_dir(&profiles_dir).map_err(|source| ConfigError::Read {
            path: profiles_dir.clone(),
            source,
        })?;

        let mut profiles: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "yaml"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        profiles.sort();

        Ok(profiles)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<PathBuf, ConfigError> {
        let config_path = Self::config_dir().join("default.yaml");
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        debug!("Saving configuration to: {}", path.display());

        let io_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let contents = serde_yaml::to_string(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        fs::write(path, contents).map_err(io_err)
    }
}
