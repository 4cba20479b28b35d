use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::config::ViewportRange;

/// Desktop user agents rotated across page sessions
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Identity presented by one page session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: Viewport,
    pub headers: Vec<(String, String)>,
}

/// Pick a user agent uniformly from the rotation pool.
pub fn pick_user_agent<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0])
}

/// Draw a viewport uniformly from the inclusive configured bounds.
pub fn random_viewport<R: Rng + ?Sized>(rng: &mut R, range: &ViewportRange) -> Viewport {
    Viewport {
        width: rng.gen_range(range.width.0..=range.width.1),
        height: rng.gen_range(range.height.0..=range.height.1),
    }
}

/// Headers sent with every navigation, including cache-busting directives.
pub fn standard_headers() -> Vec<(String, String)> {
    [
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Accept-Encoding", "gzip, deflate, br"),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Cache-Control", "no-cache"),
        ("Pragma", "no-cache"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Fingerprint {
    /// Generate a fresh fingerprint from the given random source.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, range: &ViewportRange) -> Self {
        let fingerprint = Self {
            user_agent: pick_user_agent(rng).to_string(),
            viewport: random_viewport(rng, range),
            headers: standard_headers(),
        };

        debug!(
            "Generated fingerprint: {}x{} {}",
            fingerprint.viewport.width, fingerprint.viewport.height, fingerprint.user_agent
        );

        fingerprint
    }
}
