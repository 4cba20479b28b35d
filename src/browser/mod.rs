pub mod behavior;
pub mod fingerprint;
pub mod session;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;

// Re-export common types
pub use behavior::BehaviorSimulator;
pub use fingerprint::{Fingerprint, Viewport};
pub use session::{BrowserSessionManager, PageSession};
pub use webdriver::WebDriverLauncher;

/// Options the shared browser is launched with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
}

/// Starts the shared browser process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Browser>, FetchError>;
}

/// Handle to a running browser, shared by every concurrent fetch.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open an isolated page/tab
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, FetchError>;

    /// Terminate the browser process
    async fn close(&self) -> Result<(), FetchError>;
}

/// A single page session inside the shared browser.
#[async_trait]
pub trait BrowserPage: Send {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), FetchError>;

    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), FetchError>;

    async fn set_extra_headers(&mut self, headers: &[(String, String)]) -> Result<(), FetchError>;

    /// Navigate and wait for network idleness, failing with
    /// [`FetchError::Timeout`] once `timeout` elapses.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), FetchError>;

    /// Evaluate a script in the page and return its JSON result
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, FetchError>;

    async fn mouse_move(&mut self, x: u32, y: u32) -> Result<(), FetchError>;

    /// Serialized rendered DOM
    async fn content(&mut self) -> Result<String, FetchError>;

    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}
