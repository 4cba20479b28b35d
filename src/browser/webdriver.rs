use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::{CapabilitiesHelper, ChromeCapabilities, PageLoadStrategy, WindowHandle};
use tokio::process::{Child, Command};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::browser::{Browser, BrowserLauncher, BrowserPage, LaunchOptions, Viewport};
use crate::cli::config::BrowserSettings;
use crate::error::FetchError;

/// Quiet period the resource count must hold before the page counts as idle
const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

const IDLE_PROBE: &str = "return [document.readyState, \
     performance.getEntriesByType('resource').length, location.href];";

/// Chrome's internal page for failed navigations
const ERROR_PAGE_PREFIX: &str = "chrome-error://";

const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-first-run",
    "--disable-blink-features=AutomationControlled",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

/// Starts (or connects to) a WebDriver server and opens the shared Chrome
pub struct WebDriverLauncher {
    settings: BrowserSettings,
    client: Client,
}

/// One Chrome process, driven through a single WebDriver session.
/// Every page is a tab inside it.
pub struct WebDriverBrowser {
    tabs: Arc<TabDriver>,
    /// Driver process we spawned, if any
    process: Mutex<Option<Child>>,
}

/// The session shared by all tabs.
///
/// WebDriver commands act on the focused window, so a command for a tab
/// switches to it and runs while holding the lock.
struct TabDriver {
    driver: Mutex<Option<WebDriver>>,
    /// Initial window, kept open so the session outlives its tabs
    home: WindowHandle,
}

/// One tab of the shared browser
pub struct WebDriverPage {
    tabs: Arc<TabDriver>,
    tab: WindowHandle,
    network_enabled: bool,
}

/// Capabilities for the shared browser. Navigation returns as soon as it is
/// committed; readiness is decided by polling for network idle.
fn chrome_capabilities(headless: bool) -> Result<ChromeCapabilities, FetchError> {
    let mut caps = DesiredCapabilities::chrome();

    for arg in CHROME_ARGS {
        caps.add_chrome_arg(arg).map_err(launch_err)?;
    }
    if headless {
        caps.set_headless().map_err(launch_err)?;
    }
    caps.add("pageLoadStrategy", PageLoadStrategy::None)
        .map_err(launch_err)?;

    Ok(caps)
}

impl WebDriverLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            client: Client::new(),
        }
    }

    fn spawn_driver(&self) -> Result<(String, Child), FetchError> {
        let port = self.settings.driver_port;
        let child = Command::new(&self.settings.driver_path)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FetchError::Launch(format!(
                    "Failed to start {}: {}",
                    self.settings.driver_path, e
                ))
            })?;

        info!("Spawned {} on port {}", self.settings.driver_path, port);

        Ok((format!("http://localhost:{}", port), child))
    }

    /// Poll the server status endpoint until it answers
    async fn wait_until_ready(&self, server_url: &str) -> Result<(), FetchError> {
        let status_url = format!("{}/status", server_url.trim_end_matches('/'));
        let deadline =
            Instant::now() + Duration::from_millis(self.settings.driver_startup_timeout_ms);

        loop {
            match self.client.get(&status_url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("WebDriver server ready at {}", server_url);
                    return Ok(());
                }
                Ok(response) => debug!("WebDriver status returned {}", response.status()),
                Err(e) => debug!("WebDriver not ready yet: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(FetchError::Launch(format!(
                    "WebDriver server at {} did not become ready",
                    server_url
                )));
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Browser>, FetchError> {
        let (server_url, process) = match &self.settings.webdriver_url {
            Some(url) => (url.clone(), None),
            None => {
                let (url, child) = self.spawn_driver()?;
                (url, Some(child))
            }
        };

        self.wait_until_ready(&server_url).await?;

        let caps = chrome_capabilities(options.headless)?;
        let driver = WebDriver::new(&server_url, caps)
            .await
            .map_err(|e| FetchError::Launch(format!("Failed to start browser: {}", e)))?;

        let home = match driver.window().await {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(quit) = driver.quit().await {
                    warn!("Error quitting half-started browser: {}", quit);
                }
                return Err(launch_err(e));
            }
        };

        info!("Browser started via {}", server_url);

        Ok(Arc::new(WebDriverBrowser {
            tabs: Arc::new(TabDriver {
                driver: Mutex::new(Some(driver)),
                home,
            }),
            process: Mutex::new(process),
        }))
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, FetchError> {
        let driver = self.tabs.lock().await?;
        let tab = driver
            .new_tab()
            .await
            .map_err(|e| FetchError::Browser(format!("Failed to open tab: {}", e)))?;

        Ok(Box::new(WebDriverPage {
            tabs: Arc::clone(&self.tabs),
            tab,
            network_enabled: false,
        }))
    }

    async fn close(&self) -> Result<(), FetchError> {
        let quit = match self.tabs.driver.lock().await.take() {
            Some(driver) => driver.quit().await.map_err(browser_err),
            None => Ok(()),
        };

        if let Some(mut child) = self.process.lock().await.take() {
            child
                .kill()
                .await
                .map_err(|e| FetchError::Browser(format!("Failed to stop driver: {}", e)))?;
            debug!("WebDriver process stopped");
        }

        quit
    }
}

impl TabDriver {
    async fn lock(&self) -> Result<MappedMutexGuard<'_, WebDriver>, FetchError> {
        MutexGuard::try_map(self.driver.lock().await, Option::as_mut)
            .map_err(|_| FetchError::ShutDown)
    }

    /// Lock the session with `tab` focused
    async fn focus(&self, tab: &WindowHandle) -> Result<MappedMutexGuard<'_, WebDriver>, FetchError> {
        let driver = self.lock().await?;
        driver
            .switch_to_window(tab.clone())
            .await
            .map_err(browser_err)?;
        Ok(driver)
    }
}

impl WebDriverPage {
    async fn cdp(&self, command: &str, params: serde_json::Value) -> Result<(), FetchError> {
        let driver = self.tabs.focus(&self.tab).await?;
        ChromeDevTools::new(driver.handle.clone())
            .execute_cdp_with_params(command, params)
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn enable_network(&mut self) -> Result<(), FetchError> {
        if !self.network_enabled {
            self.cdp("Network.enable", json!({})).await?;
            self.network_enabled = true;
        }
        Ok(())
    }

    async fn wait_for_network_idle(
        &mut self,
        deadline: Instant,
        timeout_ms: u64,
    ) -> Result<(), FetchError> {
        let mut tracker = IdleTracker::new(NETWORK_QUIET_WINDOW);

        loop {
            let probe = self.evaluate(IDLE_PROBE).await?;
            if let Some(state) = parse_idle_probe(&probe) {
                if state.href.starts_with(ERROR_PAGE_PREFIX) {
                    return Err(FetchError::Navigation(format!(
                        "Navigation ended on an error page ({})",
                        state.href
                    )));
                }
                // The new tab's blank document until the navigation commits
                let committed = state.href != "about:blank";
                if committed && tracker.observe(state.complete, state.resources, Instant::now()) {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(FetchError::Timeout(timeout_ms));
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), FetchError> {
        self.cdp(
            "Network.setUserAgentOverride",
            json!({ "userAgent": user_agent }),
        )
        .await
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), FetchError> {
        self.cdp(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": 0,
                "mobile": false,
            }),
        )
        .await
    }

    async fn set_extra_headers(&mut self, headers: &[(String, String)]) -> Result<(), FetchError> {
        self.enable_network().await?;

        let headers: HashMap<&str, &str> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.cdp("Network.setExtraHTTPHeaders", json!({ "headers": headers }))
            .await
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), FetchError> {
        let timeout_ms = timeout.as_millis() as u64;
        let deadline = Instant::now() + timeout;

        debug!("Navigating to: {}", url);
        {
            let driver = self.tabs.focus(&self.tab).await?;
            match tokio::time::timeout(timeout, driver.goto(url)).await {
                Err(_) => return Err(FetchError::Timeout(timeout_ms)),
                Ok(Err(e)) => {
                    let message = e.to_string();
                    if message.to_lowercase().contains("timeout") {
                        return Err(FetchError::Timeout(timeout_ms));
                    }
                    return Err(FetchError::Navigation(message));
                }
                Ok(Ok(())) => {}
            }
        }

        self.wait_for_network_idle(deadline, timeout_ms).await
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, FetchError> {
        let driver = self.tabs.focus(&self.tab).await?;
        let ret = driver
            .execute(script, Vec::new())
            .await
            .map_err(browser_err)?;
        Ok(ret.json().clone())
    }

    async fn mouse_move(&mut self, x: u32, y: u32) -> Result<(), FetchError> {
        let driver = self.tabs.focus(&self.tab).await?;
        driver
            .action_chain()
            .move_to(i64::from(x), i64::from(y))
            .perform()
            .await
            .map_err(browser_err)
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        let driver = self.tabs.focus(&self.tab).await?;
        driver.source().await.map_err(browser_err)
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        let driver = match self.tabs.focus(&self.tab).await {
            Ok(driver) => driver,
            // Browser already gone, and the tab with it
            Err(FetchError::ShutDown) => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Err(e) = driver.close_window().await {
            warn!("Error closing tab: {}", e);
            return Err(browser_err(e));
        }
        driver
            .switch_to_window(self.tabs.home.clone())
            .await
            .map_err(browser_err)
    }
}

fn browser_err(e: WebDriverError) -> FetchError {
    FetchError::Browser(e.to_string())
}

fn launch_err(e: WebDriverError) -> FetchError {
    FetchError::Launch(e.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IdleProbe {
    complete: bool,
    resources: u64,
    href: String,
}

/// Decode `[readyState, resourceCount, href]` from the idle probe.
fn parse_idle_probe(value: &serde_json::Value) -> Option<IdleProbe> {
    let items = value.as_array()?;
    Some(IdleProbe {
        complete: items.first()?.as_str()? == "complete",
        resources: items.get(1)?.as_u64()?,
        href: items.get(2)?.as_str()?.to_string(),
    })
}

/// Tracks how long the resource count has been stable.
#[derive(Debug)]
struct IdleTracker {
    quiet_window: Duration,
    last_count: Option<u64>,
    stable_since: Option<Instant>,
}

impl IdleTracker {
    fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            last_count: None,
            stable_since: None,
        }
    }

    /// Record a probe; true once the document is complete and no new
    /// resources have started for the whole quiet window.
    fn observe(&mut self, complete: bool, resources: u64, now: Instant) -> bool {
        if !complete || self.last_count != Some(resources) {
            self.last_count = Some(resources);
            self.stable_since = Some(now);
            return false;
        }

        match self.stable_since {
            Some(since) => now.duration_since(since) >= self.quiet_window,
            None => {
                self.stable_since = Some(now);
                false
            }
        }
    }
}
