//! robots.txt policy
//!
//! Best-effort politeness: anything that goes wrong while fetching or reading
//! robots.txt resolves to "allowed".

use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::utils::url::origin;

const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Disallow rules that apply to every user agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    disallow: Vec<String>,
}

impl RobotsRules {
    /// Rules that block nothing
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Collect the `Disallow` paths of every group naming `*`.
    ///
    /// Consecutive `User-agent` lines form one group; the first rule line
    /// closes the agent list.
    pub fn parse(content: &str) -> Self {
        let mut disallow = Vec::new();
        let mut group_is_wildcard = false;
        let mut in_agent_list = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if !in_agent_list {
                        group_is_wildcard = false;
                        in_agent_list = true;
                    }
                    if value == "*" {
                        group_is_wildcard = true;
                    }
                }
                "disallow" => {
                    in_agent_list = false;
                    if group_is_wildcard && !value.is_empty() {
                        disallow.push(value.to_string());
                    }
                }
                _ => in_agent_list = false,
            }
        }

        Self { disallow }
    }

    /// A URL is blocked when any disallowed path occurs in it
    pub fn is_allowed(&self, url: &str) -> bool {
        !self.disallow.iter().any(|path| url.contains(path.as_str()))
    }
}

/// Fetches robots.txt per origin and answers allow/deny per URL
pub struct RobotsChecker {
    client: Client,
    rules: RwLock<HashMap<String, Arc<RobotsRules>>>,
}

impl RobotsChecker {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(ROBOTS_TIMEOUT)
            .user_agent(concat!("smart-scraper/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for robots.txt: {}", e);
                Client::new()
            });

        Self {
            client,
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `url` may be fetched. Fails open.
    pub async fn is_allowed(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Could not check robots.txt for {}: {}", url, e);
                return true;
            }
        };
        let Some(origin) = origin(&parsed) else {
            return true;
        };

        if let Some(rules) = self.rules.read().await.get(&origin) {
            return rules.is_allowed(url);
        }

        match self.fetch_rules(&origin).await {
            Ok(rules) => {
                let rules = Arc::new(rules);
                self.rules
                    .write()
                    .await
                    .insert(origin, Arc::clone(&rules));
                rules.is_allowed(url)
            }
            Err(e) => {
                warn!("Could not check robots.txt for {}: {}", origin, e);
                true
            }
        }
    }

    async fn fetch_rules(&self, origin: &str) -> Result<RobotsRules, reqwest::Error> {
        let robots_url = format!("{}/robots.txt", origin);
        debug!("Fetching {}", robots_url);

        let response = self.client.get(&robots_url).send().await?;
        if !response.status().is_success() {
            debug!("{} returned {}; no rules apply", robots_url, response.status());
            return Ok(RobotsRules::allow_all());
        }

        let body = response.text().await?;
        Ok(RobotsRules::parse(&body))
    }
}

impl Default for RobotsChecker {
    fn default() -> Self {
        Self::new()
    }
}
