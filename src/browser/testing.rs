//! In-memory browser used by orchestration tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser::{Browser, BrowserLauncher, BrowserPage, LaunchOptions, Viewport};
use crate::error::FetchError;

#[derive(Default)]
pub struct FakeState {
    /// Page source served for every URL
    pub html: String,
    /// Navigations to URLs containing any of these fail
    pub failing: Vec<String>,
    /// Time each navigation takes
    pub nav_delay: Duration,

    pub launches: AtomicUsize,
    pub pages: AtomicUsize,
    pub gotos: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub closes: AtomicUsize,
    pub visited: Mutex<Vec<String>>,
}

impl FakeState {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Default::default()
        }
    }

    pub fn failing(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    pub fn with_nav_delay(mut self, delay: Duration) -> Self {
        self.nav_delay = delay;
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    pub state: Arc<FakeState>,
}

struct FakeBrowser {
    state: Arc<FakeState>,
}

struct FakePage {
    state: Arc<FakeState>,
}

impl FakeLauncher {
    pub fn new(state: FakeState) -> (Arc<Self>, Arc<FakeState>) {
        let state = Arc::new(state);
        (
            Arc::new(Self {
                state: Arc::clone(&state),
            }),
            state,
        )
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn Browser>, FetchError> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeBrowser {
            state: Arc::clone(&self.state),
        }))
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, FetchError> {
        self.state.pages.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> Result<(), FetchError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn set_user_agent(&mut self, _user_agent: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn set_viewport(&mut self, _viewport: Viewport) -> Result<(), FetchError> {
        Ok(())
    }

    async fn set_extra_headers(&mut self, _headers: &[(String, String)]) -> Result<(), FetchError> {
        Ok(())
    }

    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<(), FetchError> {
        let attempt = self.state.gotos.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut visited) = self.state.visited.lock() {
            visited.push(url.to_string());
        }
        if !self.state.nav_delay.is_zero() {
            tokio::time::sleep(self.state.nav_delay).await;
        }
        if self.state.failing.iter().any(|p| url.contains(p.as_str())) {
            return Err(FetchError::Navigation(format!(
                "net::ERR_CONNECTION_REFUSED (navigation {})",
                attempt
            )));
        }
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, FetchError> {
        Ok(serde_json::Value::Null)
    }

    async fn mouse_move(&mut self, _x: u32, _y: u32) -> Result<(), FetchError> {
        Ok(())
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        Ok(self.state.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
