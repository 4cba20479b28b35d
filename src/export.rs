//! Serialization of result collections
//!
//! JSON mirrors the result model, text is a human-readable report and CSV is
//! a flat one-row-per-URL summary.

use csv::{QuoteStyle, WriterBuilder};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tracing::info;

use crate::crawler::result::FetchResult;
use crate::error::ExportError;

pub const CSV_HEADERS: [&str; 8] = [
    "URL",
    "Status",
    "Title",
    "Meta Description",
    "Main Content Length",
    "Headings Count",
    "Links Count",
    "Load Time (ms)",
];

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Txt,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" => Ok(ExportFormat::Txt),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
        })
    }
}

/// Render results in the requested format
pub fn export_results(results: &[FetchResult], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(results)?),
        ExportFormat::Txt => Ok(format_text(results)),
        ExportFormat::Csv => format_csv(results),
    }
}

/// Render results and write them to `path`, creating parent directories
pub async fn write_export(
    results: &[FetchResult],
    format: ExportFormat,
    path: &Path,
) -> Result<PathBuf, ExportError> {
    let rendered = export_results(results, format)?;
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    fs::write(path, rendered).await.map_err(io_err)?;

    info!("Exported {} results to {}", results.len(), path.display());
    Ok(path.to_path_buf())
}

fn format_text(results: &[FetchResult]) -> String {
    let mut out = String::new();

    for result in results {
        // Writing into a String cannot fail
        let _ = write_text_block(&mut out, result);
    }

    out
}

fn write_text_block(out: &mut String, result: &FetchResult) -> std::fmt::Result {
    writeln!(out, "Website: {}", result.url)?;
    writeln!(out, "Status: {}", result.status)?;
    match &result.timestamp {
        Some(ts) => writeln!(out, "Last Updated: {}\n", ts.to_rfc3339())?,
        None => writeln!(out, "Last Updated: n/a\n")?,
    }

    if let Some(content) = &result.content {
        writeln!(out, "MAIN CONTENT:")?;
        writeln!(out, "- Page title: {}", content.title)?;
        writeln!(out, "- Meta description: {}\n", content.meta_description)?;

        if !content.headings.is_empty() {
            writeln!(out, "HEADINGS:")?;
            for heading in &content.headings {
                writeln!(out, "{} {}", "#".repeat(heading.level as usize), heading.text)?;
            }
            writeln!(out)?;
        }

        if !content.main_content.is_empty() {
            writeln!(out, "BODY TEXT:\n{}\n", content.main_content)?;
        }
    }

    if !result.related_pages.is_empty() {
        writeln!(out, "NAVIGATION:")?;
        for page in &result.related_pages {
            writeln!(out, "- {}: {}", page.keyword, page.href)?;
        }
        writeln!(out)?;
    }

    if let Some(notes) = &result.technical_notes {
        writeln!(out, "TECHNICAL NOTES:")?;
        writeln!(out, "- Loading method: {}", notes.method)?;
        if !notes.challenges.is_empty() {
            writeln!(out, "- Challenges: {}", notes.challenges.join(", "))?;
        }
        if !notes.recommendations.is_empty() {
            writeln!(out, "- Recommendations: {}", notes.recommendations.join(", "))?;
        }
    }

    if let Some(error) = &result.error {
        writeln!(out, "Error: {}", error)?;
    }

    write!(out, "\n{}\n\n", "=".repeat(RULE_WIDTH))
}

/// Length in UTF-16 code units, the unit browsers report string lengths in
fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

fn format_csv(results: &[FetchResult]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADERS)?;

    for result in results {
        let content = result.content.as_ref();
        writer.write_record([
            result.url.clone(),
            result.status.to_string(),
            content.map(|c| c.title.clone()).unwrap_or_default(),
            content.map(|c| c.meta_description.clone()).unwrap_or_default(),
            content
                .map(|c| utf16_len(&c.main_content))
                .unwrap_or(0)
                .to_string(),
            content.map(|c| c.headings.len()).unwrap_or(0).to_string(),
            content.map(|c| c.links.len()).unwrap_or(0).to_string(),
            result.load_time_ms.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
