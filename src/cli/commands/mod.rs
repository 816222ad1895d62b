//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod fetch;
mod queue;
mod resolve;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, Settings};
use crate::http_client::HttpClient;
use crate::pages::PageScraper;
use crate::redirect::RedirectResolver;
use crate::services::{FsArchiveSink, MetricsSink, PdftotextExtractor};

/// Which page variant `scrape-page` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PageKindArg {
    /// Publisher landing page for a DOI
    Publisher,
    /// Repository record page
    Repository,
}

#[derive(Parser)]
#[command(name = "oafind")]
#[command(about = "Find legal open-access copies of scholarly works")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL, follow its redirects and print how the final page classifies
    Fetch {
        /// URL to fetch
        url: String,
        /// Publisher name, enables publisher-specific redirect and markup rules
        #[arg(long)]
        publisher: Option<String>,
    },

    /// Scrape a single landing page and print the outcome
    ScrapePage {
        /// Landing page URL
        url: String,
        /// Kind of page
        #[arg(short, long, value_enum, default_value = "publisher")]
        kind: PageKindArg,
    },

    /// Resolve a work bundle (work plus its harvested targets) to its OA locations
    Resolve {
        /// Bundle file (JSON, TOML or YAML) with `work` and `targets`
        bundle: PathBuf,
    },

    /// Store harvested targets and enqueue the ones due for a scrape
    ImportTargets {
        /// Targets file (JSON, TOML or YAML list)
        targets: PathBuf,
    },

    /// Scrape queued targets with the worker pool
    RunQueue {
        /// Targets claimed per batch (default: from config)
        #[arg(long)]
        chunk: Option<usize>,
        /// Stop after this many targets
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only scrape targets from this endpoint (or host)
        #[arg(short, long)]
        endpoint: Option<String>,
        /// Run a single batch and exit
        #[arg(long)]
        once: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective settings (credentials masked)
    Show,
}

/// Redirect resolver over a fetcher configured from `settings`.
fn build_resolver(settings: &Settings) -> RedirectResolver {
    RedirectResolver::new(HttpClient::new(settings.fetch.clone())).with_limits(settings.redirect)
}

/// Page scraper with the configured collaborators.
fn build_scraper(settings: &Settings, metrics: Arc<dyn MetricsSink>) -> PageScraper {
    let mut pdf_text = PdftotextExtractor::new();
    if let Some(ref binary) = settings.pdftotext_binary {
        pdf_text = pdf_text.with_binary(binary);
    }

    let mut scraper = PageScraper::new(build_resolver(settings))
        .with_pdf_text(Arc::new(pdf_text))
        .with_metrics(metrics)
        .with_europepmc_api_url(settings.europepmc_api_url.clone());
    if let Some(ref dir) = settings.archive_dir {
        scraper = scraper.with_archive(Arc::new(FsArchiveSink::new(dir.clone())));
    }
    scraper
}

/// Print `value` as pretty JSON on stdout.
fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (settings, config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Fetch { url, publisher } => fetch::cmd_fetch(&settings, &url, publisher.as_deref()).await,
        Commands::ScrapePage { url, kind } => fetch::cmd_scrape_page(&settings, &url, kind).await,
        Commands::Resolve { bundle } => resolve::cmd_resolve(&settings, &bundle).await,
        Commands::ImportTargets { targets } => queue::cmd_import_targets(&settings, &targets).await,
        Commands::RunQueue {
            chunk,
            limit,
            endpoint,
            once,
        } => queue::cmd_run_queue(&settings, chunk, limit, endpoint, once).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&settings, &config),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_queue() {
        let cli = Cli::try_parse_from([
            "oafind", "run-queue", "--chunk", "20", "--limit", "5", "--endpoint", "repo-1", "--once",
        ])
        .unwrap();
        match cli.command {
            Commands::RunQueue {
                chunk,
                limit,
                endpoint,
                once,
            } => {
                assert_eq!(chunk, Some(20));
                assert_eq!(limit, Some(5));
                assert_eq!(endpoint.as_deref(), Some("repo-1"));
                assert!(once);
            }
            _ => panic!("expected run-queue"),
        }
    }

    #[test]
    fn test_parse_scrape_page_kind() {
        let cli = Cli::try_parse_from([
            "oafind",
            "-v",
            "scrape-page",
            "https://repo.example.edu/record/1",
            "--kind",
            "repository",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::ScrapePage {
                kind: PageKindArg::Repository,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["oafind", "scrape-page", "x", "--kind", "journal"]).is_err());
    }
}
