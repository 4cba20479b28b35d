use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::Viewport;

/// Loading method reported in technical notes
pub const METHOD: &str = "browser-automation";

/// Error reported for URLs disallowed by robots.txt
pub const BLOCKED_MESSAGE: &str = "Access blocked by robots.txt";

/// Advice attached to every failed fetch
pub const FAILURE_RECOMMENDATIONS: &[&str] = &[
    "Check if the website is accessible",
    "Try with a different browser identity",
    "Check for rate limiting",
];

/// Outcome of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Success,
    Failed,
    Blocked,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchStatus::Success => "Success",
            FetchStatus::Failed => "Failed",
            FetchStatus::Blocked => "Blocked",
        };
        f.write_str(s)
    }
}

/// Result of scraping one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    /// URL that was requested
    pub url: String,

    pub status: FetchStatus,

    /// When the content was captured (successful fetches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Time from the start of the fetch until the result was ready
    pub load_time_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentRecord>,

    #[serde(default)]
    pub image_alt_texts: Vec<ImageAltText>,

    #[serde(default)]
    pub related_pages: Vec<RelatedPage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_notes: Option<TechnicalNotes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Served from the result cache
    #[serde(default)]
    pub cached: bool,
}

/// Structured content of a rendered page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub headings: Vec<Heading>,
    pub lists: Vec<ListBlock>,
    pub tables: Vec<Table>,
    pub links: Vec<Link>,
    pub main_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1 through 6
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Ul,
    Ol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBlock {
    #[serde(rename = "type")]
    pub kind: ListKind,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAltText {
    pub src: String,
    pub alt: String,
}

/// Same-site page worth visiting next (about, pricing, faq, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedPage {
    pub href: String,
    pub keyword: String,
    pub text: String,
}

/// Diagnostics about how the page was loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    pub method: String,
    pub challenges: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Everything one successful attempt produced
#[derive(Debug, Clone, PartialEq)]
pub struct PageCapture {
    pub content: ContentRecord,
    pub image_alt_texts: Vec<ImageAltText>,
    pub related_pages: Vec<RelatedPage>,
    pub user_agent: String,
    pub viewport: Viewport,
}

impl FetchResult {
    pub fn success(url: &str, capture: PageCapture, load_time_ms: u64) -> Self {
        Self {
            url: url.to_string(),
            status: FetchStatus::Success,
            timestamp: Some(Utc::now()),
            load_time_ms,
            content: Some(capture.content),
            image_alt_texts: capture.image_alt_texts,
            related_pages: capture.related_pages,
            technical_notes: Some(TechnicalNotes {
                user_agent: Some(capture.user_agent),
                viewport: Some(capture.viewport),
                method: METHOD.to_string(),
                challenges: Vec::new(),
                recommendations: Vec::new(),
            }),
            error: None,
            cached: false,
        }
    }

    pub fn failed(url: &str, error: &str, load_time_ms: u64) -> Self {
        Self {
            url: url.to_string(),
            status: FetchStatus::Failed,
            timestamp: None,
            load_time_ms,
            content: None,
            image_alt_texts: Vec::new(),
            related_pages: Vec::new(),
            technical_notes: Some(TechnicalNotes {
                user_agent: None,
                viewport: None,
                method: METHOD.to_string(),
                challenges: vec![error.to_string()],
                recommendations: FAILURE_RECOMMENDATIONS
                    .iter()
                    .map(|r| r.to_string())
                    .collect(),
            }),
            error: Some(error.to_string()),
            cached: false,
        }
    }

    pub fn blocked(url: &str, load_time_ms: u64) -> Self {
        Self {
            url: url.to_string(),
            status: FetchStatus::Blocked,
            timestamp: None,
            load_time_ms,
            content: None,
            image_alt_texts: Vec::new(),
            related_pages: Vec::new(),
            technical_notes: None,
            error: Some(BLOCKED_MESSAGE.to_string()),
            cached: false,
        }
    }

    /// Re-serve a cached payload under the URL that was asked for, stamped
    /// with this lookup's elapsed time.
    pub fn from_cache(cached: FetchResult, url: &str, load_time_ms: u64) -> Self {
        Self {
            url: url.to_string(),
            cached: true,
            load_time_ms,
            ..cached
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> PageCapture {
        PageCapture {
            content: ContentRecord {
                title: "Example".into(),
                ..Default::default()
            },
            image_alt_texts: vec![],
            related_pages: vec![],
            user_agent: "UA".into(),
            viewport: Viewport {
                width: 1280,
                height: 900,
            },
        }
    }

    #[test]
    fn test_content_xor_error() {
        let ok = FetchResult::success("https://example.com", capture(), 120);
        assert!(ok.content.is_some() && ok.error.is_none());
        assert!(ok.timestamp.is_some());

        let failed = FetchResult::failed("https://example.com", "boom", 900);
        assert!(failed.content.is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));
        let notes = failed.technical_notes.unwrap();
        assert_eq!(notes.challenges, vec!["boom".to_string()]);
        assert_eq!(notes.recommendations.len(), 3);

        let blocked = FetchResult::blocked("https://example.com", 3);
        assert_eq!(blocked.error.as_deref(), Some(BLOCKED_MESSAGE));
        assert!(blocked.content.is_none());
        assert!(blocked.technical_notes.is_none());
    }

    #[test]
    fn test_from_cache_wraps_without_touching_content() {
        let original = FetchResult::success("https://Example.com/", capture(), 1500);
        let served = FetchResult::from_cache(original.clone(), "https://example.com#top", 4);

        assert!(served.cached);
        assert_eq!(served.url, "https://example.com#top");
        assert_eq!(served.load_time_ms, 4);
        assert_eq!(served.content, original.content);
        assert!(!original.cached);
    }

    #[test]
    fn test_json_field_names() {
        let result = FetchResult::success("https://example.com", capture(), 10);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["status"], "Success");
        assert_eq!(value["loadTimeMs"], 10);
        assert!(value["content"]["mainContent"].is_string());
        assert_eq!(value["technicalNotes"]["method"], METHOD);
        assert!(value.get("error").is_none());
    }
}
