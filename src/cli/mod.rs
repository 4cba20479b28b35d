pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file (the platform data directory when no path is given)
    #[arg(long, global = true, num_args = 0..=1, value_name = "PATH")]
    pub log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a single URL
    Scrape {
        /// URL to scrape
        #[arg(required = true)]
        url: String,

        #[command(flatten)]
        options: ScrapeArgs,
    },

    /// Scrape every URL listed in a file, one per line
    Batch {
        /// File with URLs; blank lines and lines starting with '#' are skipped
        #[arg(required = true)]
        file: PathBuf,

        #[command(flatten)]
        options: ScrapeArgs,
    },

    /// Scrape the URLs given on the command line
    List {
        /// URLs to scrape
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,

        #[command(flatten)]
        options: ScrapeArgs,
    },

    /// Show or initialize configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// List saved configuration profiles
        #[arg(short, long)]
        list: bool,

        /// Profile to show
        #[arg(short, long)]
        profile: Option<String>,

        /// Configuration file to show
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Options shared by every scraping command
#[derive(Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// Output format (json, txt, csv)
    #[arg(short, long, default_value = "json")]
    pub format: String,

    /// Write results to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run the browser headless
    #[arg(long, action = ArgAction::Set)]
    pub headless: Option<bool>,

    /// Page-load timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts per URL
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delay range between actions in milliseconds, e.g. 1000-3000
    #[arg(long, value_parser = commands::parse_delay_range)]
    pub delay: Option<commands::DelayRange>,

    /// Maximum concurrent page loads
    #[arg(short = 'c', long)]
    pub concurrent: Option<usize>,

    /// Bypass the result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Ignore robots.txt
    #[arg(long)]
    pub no_robots: bool,

    /// Skip image alt text extraction
    #[arg(long)]
    pub no_alt_text: bool,

    /// Configuration file to load
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Saved configuration profile to load
    #[arg(short, long)]
    pub profile: Option<String>,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scrape { url, options } => {
            info!("Scraping {}", url);
            commands::scrape(url, options).await
        }
        Commands::Batch { file, options } => {
            info!("Scraping URLs from {}", file.display());
            commands::batch(file, options).await
        }
        Commands::List { urls, options } => {
            info!("Scraping {} URLs from the command line", urls.len());
            commands::list(urls, options).await
        }
        Commands::Config {
            init,
            list,
            profile,
            config,
        } => {
            if init {
                info!("Writing default configuration");
                commands::init_config()
            } else if list {
                info!("Listing all configuration profiles");
                commands::list_profiles()
            } else {
                commands::show_config(config, profile)
            }
        }
    }
}
