use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use crate::cli::config::CacheSettings;
use crate::crawler::result::FetchResult;
use crate::utils::url::normalize_url;

/// One cached fetch, stored as `{key}.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub url: String,
    pub data: FetchResult,
    /// Write time, milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

/// Content-addressed on-disk cache of successful fetches
///
/// Failures never escape: a read error is a miss and a write error is
/// logged and dropped.
#[derive(Debug, Clone)]
pub struct CacheStore {
    enabled: bool,
    directory: PathBuf,
    ttl: Duration,
}

/// Stable key for a URL: hex SHA-256 of its normalized form
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(normalize_url(url).as_bytes()))
}

impl CacheStore {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            directory: settings.directory.clone(),
            ttl: settings.ttl(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.directory.join(format!("{}.json", cache_key(url)))
    }

    /// Cached result for `url`, unless absent, unreadable or older than the TTL
    pub async fn get(&self, url: &str) -> Option<FetchResult> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(url);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        let age_ms = Utc::now().timestamp_millis() - entry.timestamp_ms;
        if age_ms < 0 || age_ms as u128 >= self.ttl.as_millis() {
            debug!("Cache entry for {} expired ({} ms old)", url, age_ms);
            return None;
        }

        debug!("Cache hit for {}", url);
        Some(entry.data)
    }

    /// Store a result under the URL's key, stamped with the current time
    pub async fn put(&self, url: &str, result: &FetchResult) {
        if !self.enabled {
            return;
        }

        let entry = CacheEntry {
            url: url.to_string(),
            data: result.clone(),
            timestamp_ms: Utc::now().timestamp_millis(),
        };
        self.write_entry(&entry).await;
    }

    async fn write_entry(&self, entry: &CacheEntry) {
        if let Err(e) = fs::create_dir_all(&self.directory).await {
            warn!(
                "Could not create cache directory {}: {}",
                self.directory.display(),
                e
            );
            return;
        }

        let path = self.entry_path(&entry.url);
        let json = match serde_json::to_vec_pretty(entry) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize cache entry for {}: {}", entry.url, e);
                return;
            }
        };

        match fs::write(&path, json).await {
            Ok(()) => debug!("Cached {} at {}", entry.url, path.display()),
            Err(e) => warn!("Cache write failed for {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::result::FetchResult;
    use tempfile::TempDir;

    fn store(dir: &TempDir, enabled: bool) -> CacheStore {
        CacheStore::new(&CacheSettings {
            enabled,
            directory: dir.path().join("cache"),
            ttl_secs: 60,
        })
    }

    fn sample(url: &str) -> FetchResult {
        FetchResult::failed(url, "placeholder", 10)
    }

    #[test]
    fn test_cache_key_is_stable_hex() {
        let key = cache_key("https://example.com/a");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key("https://EXAMPLE.com/a#frag"));
        assert_ne!(key, cache_key("https://example.com/b"));
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, true);
        let url = "https://example.com/page";

        assert!(cache.get(url).await.is_none());
        cache.put(url, &sample(url)).await;

        let hit = cache.get(url).await.unwrap();
        assert_eq!(hit, sample(url));
        assert!(cache.directory().join(format!("{}.json", cache_key(url))).exists());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, true);
        let url = "https://example.com/old";

        let entry = CacheEntry {
            url: url.to_string(),
            data: sample(url),
            timestamp_ms: Utc::now().timestamp_millis() - 61_000,
        };
        cache.write_entry(&entry).await;

        assert!(cache.get(url).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, false);
        let url = "https://example.com/page";

        cache.put(url, &sample(url)).await;
        assert!(cache.get(url).await.is_none());
        assert!(!cache.directory().exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = store(&dir, true);
        let url = "https://example.com/page";

        std::fs::create_dir_all(cache.directory()).unwrap();
        std::fs::write(cache.entry_path(url), b"{not json").unwrap();

        assert!(cache.get(url).await.is_none());
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let cache = CacheStore::new(&CacheSettings {
            enabled: true,
            directory: blocker.join("cache"),
            ttl_secs: 60,
        });
        let url = "https://example.com/page";

        cache.put(url, &sample(url)).await;
        assert!(cache.get(url).await.is_none());
    }
}
