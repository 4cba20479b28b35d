//! Structured content extraction from rendered documents
//!
//! Everything here is pure: the same HTML and base URL always produce the same
//! record. Text is normalized everywhere by collapsing whitespace runs to a
//! single space and trimming.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::crawler::result::{
    ContentRecord, Heading, ImageAltText, Link, ListBlock, ListKind, RelatedPage, Table,
};
use crate::error::FetchError;

/// Candidates for the primary content region, in priority order
pub const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "[role=\"main\"]",
    ".main-content",
    ".content",
    "#content",
    ".post-content",
    ".article-content",
];

/// Keywords that mark a link as a related page
pub const RELATED_KEYWORDS: &[&str] = &[
    "about", "pricing", "faq", "contact", "help", "support", "terms", "privacy",
];

pub const MAX_RELATED_PAGES: usize = 5;

/// Collapse whitespace runs into single spaces and trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css)
        .map_err(|e| FetchError::Extraction(format!("invalid selector {}: {:?}", css, e)))
}

fn element_text(element: &ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<String>())
}

/// Resolve an href against the page URL. Relative references are kept as
/// written when the page URL cannot be parsed.
fn resolve(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(absolute) => absolute.to_string(),
        None => href.to_string(),
    }
}

/// Hrefs that never lead to another document
fn is_navigable(href: &str) -> bool {
    !href.is_empty() && !href.starts_with('#') && !href.to_ascii_lowercase().starts_with("javascript:")
}

/// A rendered document ready for extraction
pub struct Document {
    html: Html,
    base: Option<Url>,
}

impl Document {
    pub fn parse(html: &str, page_url: &str) -> Self {
        Self {
            html: Html::parse_document(html),
            base: Url::parse(page_url).ok(),
        }
    }

    /// Produce the full content record
    pub fn extract_content(&self) -> Result<ContentRecord, FetchError> {
        Ok(ContentRecord {
            title: self.title()?,
            meta_description: self.meta("description")?,
            meta_keywords: self.meta("keywords")?,
            headings: self.headings()?,
            lists: self.lists()?,
            tables: self.tables()?,
            links: self.links()?,
            main_content: self.main_content()?,
        })
    }

    fn title(&self) -> Result<String, FetchError> {
        let sel = selector("title")?;
        Ok(self
            .html
            .select(&sel)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default())
    }

    fn meta(&self, name: &str) -> Result<String, FetchError> {
        let sel = selector(&format!("meta[name=\"{}\"]", name))?;
        Ok(self
            .html
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content"))
            .unwrap_or_default()
            .to_string())
    }

    /// All h1 headings first, then all h2, and so on; document order within
    /// each level.
    fn headings(&self) -> Result<Vec<Heading>, FetchError> {
        let mut headings = Vec::new();
        for level in 1..=6u8 {
            let sel = selector(&format!("h{}", level))?;
            headings.extend(self.html.select(&sel).map(|el| Heading {
                level,
                text: element_text(&el),
            }));
        }
        Ok(headings)
    }

    fn lists(&self) -> Result<Vec<ListBlock>, FetchError> {
        let list_sel = selector("ul, ol")?;
        let item_sel = selector("li")?;

        Ok(self
            .html
            .select(&list_sel)
            .map(|list| ListBlock {
                kind: if list.value().name() == "ol" {
                    ListKind::Ol
                } else {
                    ListKind::Ul
                },
                items: list.select(&item_sel).map(|li| element_text(&li)).collect(),
            })
            .collect())
    }

    fn tables(&self) -> Result<Vec<Table>, FetchError> {
        let table_sel = selector("table")?;
        let row_sel = selector("tr")?;
        let cell_sel = selector("td, th")?;

        Ok(self
            .html
            .select(&table_sel)
            .map(|table| Table {
                rows: table
                    .select(&row_sel)
                    .map(|row| row.select(&cell_sel).map(|c| element_text(&c)).collect())
                    .collect(),
            })
            .collect())
    }

    /// Anchors with visible text and a navigable href, resolved to absolute URLs
    fn links(&self) -> Result<Vec<Link>, FetchError> {
        let sel = selector("a[href]")?;
        let mut links = Vec::new();

        for anchor in self.html.select(&sel) {
            let href = anchor.value().attr("href").unwrap_or_default().trim();
            if !is_navigable(href) {
                continue;
            }
            let text = element_text(&anchor);
            if text.is_empty() {
                continue;
            }
            links.push(Link {
                href: resolve(self.base.as_ref(), href),
                text,
            });
        }

        Ok(links)
    }

    fn main_content(&self) -> Result<String, FetchError> {
        for css in MAIN_CONTENT_SELECTORS {
            let sel = selector(css)?;
            if let Some(el) = self.html.select(&sel).next() {
                return Ok(element_text(&el));
            }
        }

        let body = selector("body")?;
        Ok(match self.html.select(&body).next() {
            Some(el) => element_text(&el),
            None => element_text(&self.html.root_element()),
        })
    }

    /// Same-site links whose href or text mentions a related-page keyword.
    ///
    /// One entry per unique href; the first matching keyword wins; at most
    /// [`MAX_RELATED_PAGES`] entries in document order.
    pub fn find_related_pages(&self, base_url: &str) -> Result<Vec<RelatedPage>, FetchError> {
        let sel = selector("a[href]")?;
        let mut seen = HashSet::new();
        let mut related = Vec::new();

        for anchor in self.html.select(&sel) {
            if related.len() >= MAX_RELATED_PAGES {
                break;
            }

            let raw = anchor.value().attr("href").unwrap_or_default().trim();
            if !is_navigable(raw) {
                continue;
            }
            let href = resolve(self.base.as_ref(), raw);
            if !href.starts_with(base_url) || seen.contains(&href) {
                continue;
            }

            let text = element_text(&anchor).to_lowercase();
            let href_lower = href.to_lowercase();
            let keyword = RELATED_KEYWORDS
                .iter()
                .find(|k| text.contains(*k) || href_lower.contains(*k));

            if let Some(keyword) = keyword {
                seen.insert(href.clone());
                related.push(RelatedPage {
                    href,
                    keyword: keyword.to_string(),
                    text,
                });
            }
        }

        Ok(related)
    }

    /// Alt text of every image that has any. No pixel-level recognition.
    pub fn extract_image_alt_texts(&self) -> Result<Vec<ImageAltText>, FetchError> {
        let sel = selector("img[alt]")?;

        Ok(self
            .html
            .select(&sel)
            .filter_map(|img| {
                let alt = img.value().attr("alt")?.trim();
                if alt.is_empty() {
                    return None;
                }
                let src = img
                    .value()
                    .attr("src")
                    .map(|s| resolve(self.base.as_ref(), s.trim()))
                    .unwrap_or_default();
                Some(ImageAltText {
                    src,
                    alt: alt.to_string(),
                })
            })
            .collect())
    }
}
