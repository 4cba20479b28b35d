//! Browser-driven web content scraper
//!
//! Fetches rendered pages through a shared WebDriver browser, extracts
//! structured content, caches results on disk and exports them as JSON,
//! text or CSV.

pub mod browser;
pub mod cli;
pub mod crawler;
pub mod error;
pub mod export;
pub mod robots;
pub mod storage;
pub mod utils;

pub use cli::config::{ScrapeConfig, ScrapeOverrides};
pub use crawler::{ExportOutput, FetchResult, FetchStatus, ScraperEngine};
pub use error::{ConfigError, ExportError, FetchError};
pub use export::ExportFormat;
