use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crate-level filter directive for the chosen verbosity
fn crate_directive(verbose: bool) -> &'static str {
    if verbose {
        "smart_scraper=debug"
    } else {
        "smart_scraper=info"
    }
}

/// Initialize the logging system
///
/// Logs go to stderr so exported results on stdout stay clean. With a log
/// file, the same events are also appended there without ANSI colors.
pub fn init_logging(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(crate_directive(verbose).parse()?)
        .add_directive("warn".parse()?);

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);

    if let Some(log_file) = log_file {
        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Create a default log file path
pub fn default_log_file() -> PathBuf {
    let mut path = if let Some(proj_dirs) =
        directories::ProjectDirs::from("com", "smart-scraper", "smart-scraper")
    {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from("./logs")
    };

    path.push("scraper.log");
    path
}
