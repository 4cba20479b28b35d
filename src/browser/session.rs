use rand::thread_rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::browser::fingerprint::Fingerprint;
use crate::browser::{Browser, BrowserLauncher, BrowserPage, LaunchOptions};
use crate::cli::config::ViewportRange;
use crate::crawler::cancel;
use crate::error::FetchError;

/// Browser session manager
///
/// Owns the one browser shared by every fetch. The browser is launched on the
/// first page request and reused until [`BrowserSessionManager::shutdown`].
pub struct BrowserSessionManager {
    /// Backend that starts the browser
    launcher: Arc<dyn BrowserLauncher>,

    /// Launch options
    options: LaunchOptions,

    /// Viewport bounds for fingerprints
    viewport_range: ViewportRange,

    /// Shared browser, initialized at most once
    browser: OnceCell<Arc<dyn Browser>>,

    /// Serializes teardown against late initialization
    lifecycle: Mutex<()>,

    /// Set once shutdown has started
    closed: AtomicBool,

    /// Pages opened over the manager's lifetime
    pages_opened: AtomicUsize,
}

/// An open page together with the identity it presents
pub struct PageSession {
    pub page: Box<dyn BrowserPage>,
    pub fingerprint: Fingerprint,
}

impl BrowserSessionManager {
    /// Create a new session manager; nothing is launched yet
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        options: LaunchOptions,
        viewport_range: ViewportRange,
    ) -> Self {
        Self {
            launcher,
            options,
            viewport_range,
            browser: OnceCell::new(),
            lifecycle: Mutex::new(()),
            closed: AtomicBool::new(false),
            pages_opened: AtomicUsize::new(0),
        }
    }

    /// Whether the shared browser has been launched
    pub fn is_launched(&self) -> bool {
        self.browser.initialized()
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::Relaxed)
    }

    /// Get the shared browser, launching it on first use
    async fn browser(&self) -> Result<Arc<dyn Browser>, FetchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FetchError::ShutDown);
        }

        let browser = self
            .browser
            .get_or_try_init(|| async {
                let _guard = self.lifecycle.lock().await;
                if self.closed.load(Ordering::Acquire) {
                    return Err(FetchError::ShutDown);
                }
                info!("Launching shared browser (headless: {})", self.options.headless);
                self.launcher.launch(&self.options).await
            })
            .await?;

        Ok(Arc::clone(browser))
    }

    /// Open an isolated page with a freshly randomized fingerprint
    pub async fn open_page(&self, cancel: &CancellationToken) -> Result<PageSession, FetchError> {
        let browser = cancel::guard(cancel, self.browser()).await?;

        let fingerprint = Fingerprint::generate(&mut thread_rng(), &self.viewport_range);

        let mut page = cancel::guard(cancel, browser.new_page()).await?;
        self.pages_opened.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = Self::apply_fingerprint(page.as_mut(), &fingerprint).await {
            Self::close_page(page).await;
            return Err(e);
        }

        debug!("Opened page with user agent: {}", fingerprint.user_agent);

        Ok(PageSession { page, fingerprint })
    }

    async fn apply_fingerprint(
        page: &mut dyn BrowserPage,
        fingerprint: &Fingerprint,
    ) -> Result<(), FetchError> {
        page.set_user_agent(&fingerprint.user_agent).await?;
        page.set_viewport(fingerprint.viewport).await?;
        page.set_extra_headers(&fingerprint.headers).await
    }

    /// Close a page, leaving the shared browser running
    pub async fn close_page(page: Box<dyn BrowserPage>) {
        if let Err(e) = page.close().await {
            error!("Error closing page: {}", e);
        }
    }

    /// Close the shared browser. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Browser session manager already shut down");
            return;
        }

        if let Some(browser) = self.browser.get() {
            if let Err(e) = browser.close().await {
                error!("Error closing browser: {}", e);
            }
            info!("Shared browser closed");
        }
    }
}
