//! linkhound main entry point
//!
//! This is the command-line interface for the linkhound media link harvester.

use anyhow::{Context, Result};
use clap::Parser;
use linkhound::config::{compute_config_hash, load_config_with_hash, Config, Preferences};
use linkhound::crawler::{
    build_http_client, fetch_page, Collaborators, HttpFetcher, Session, SessionOptions,
};
use linkhound::dictionary::{load_dictionary, Dictionary};
use linkhound::download::{DownloadSettings, HttpDownloadBackend};
use linkhound::extract::DefaultExtractor;
use linkhound::output::{print_statistics, JsonLinesView, LogView, ViewSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Interval between two checks of the configuration file
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// linkhound: a rule-driven media link harvester
///
/// linkhound matches pages against a dictionary of host rules, resolves
/// every match into download links and downloads them with a bounded
/// number of parallel transfers.
#[derive(Parser, Debug)]
#[command(name = "linkhound")]
#[command(version)]
#[command(about = "A rule-driven media link harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Pages to harvest
    #[arg(value_name = "PAGE_URL", required_unless_present = "dry_run")]
    pages: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and dictionary, print every dictionary error and exit
    #[arg(long)]
    dry_run: bool,

    /// Reload download preferences whenever the config file changes
    #[arg(long)]
    watch_config: bool,

    /// Queue the candidates found on the pages without processing them
    #[arg(long, conflicts_with = "dry_run")]
    paused: bool,

    /// Print processor snapshots as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let dictionary_path = dictionary_path(&cli.config, &config);
    let dictionary = load_dictionary(&dictionary_path)
        .with_context(|| format!("Failed to load dictionary {}", dictionary_path.display()))?;

    if cli.dry_run {
        handle_dry_run(&config, &dictionary);
        return Ok(());
    }

    handle_harvest(&cli, config, config_hash, dictionary).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("linkhound=info,warn"),
            1 => EnvFilter::new("linkhound=debug,info"),
            2 => EnvFilter::new("linkhound=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Relative dictionary paths are taken from the config file's directory
fn dictionary_path(config_path: &Path, config: &Config) -> PathBuf {
    let path = PathBuf::from(&config.dictionary.path);
    match config_path.parent() {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

/// Handles the --dry-run mode: shows the configuration and dictionary problems
fn handle_dry_run(config: &Config, dictionary: &Dictionary) {
    println!("=== linkhound Dry Run ===\n");

    println!("User Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nDownloads:");
    println!("  Output directory: {}", config.downloads.output_directory);
    println!(
        "  Max parallel downloads: {}",
        config.downloads.max_parallel_downloads
    );
    println!("  Conflict action: {}", config.downloads.conflict_action.as_str());
    println!("  Minimum file size: {}", config.downloads.min_file_size);

    println!("\nDictionary:");
    println!("  Id: {}", dictionary.id.as_deref().unwrap_or("-"));
    println!("  Version: {}", dictionary.version.as_deref().unwrap_or("-"));
    println!("  Spec: {}", dictionary.spec.as_deref().unwrap_or("-"));
    println!(
        "  Rules: {} ({} valid)",
        dictionary.rules.len(),
        dictionary.valid_rules().count()
    );
    for rule in &dictionary.rules {
        let mark = if rule.is_valid() { "✓" } else { "✗" };
        println!("    {} {} ({})", mark, rule.id, rule.search.name());
    }

    if dictionary.is_clean() {
        println!("\n✓ Dictionary is valid");
    } else {
        println!("\nDictionary errors ({}):", dictionary.errors.len());
        for error in &dictionary.errors {
            println!("  - {}", error);
        }
    }
}

/// Handles the main harvest operation
async fn handle_harvest(
    cli: &Cli,
    config: Config,
    config_hash: String,
    dictionary: Dictionary,
) -> Result<()> {
    if !dictionary.is_clean() {
        tracing::warn!(
            "Dictionary has {} errors, invalid rules are skipped",
            dictionary.errors.len()
        );
    }

    let client = build_http_client(&config.user_agent).context("Failed to build HTTP client")?;
    let fetcher = Arc::new(HttpFetcher::new(client.clone()));
    let (backend, deltas) =
        HttpDownloadBackend::new(client, DownloadSettings::from(&config.downloads));

    let (preferences_tx, preferences_rx) = watch::channel(config.preferences());
    if cli.watch_config {
        tokio::spawn(watch_config(cli.config.clone(), config_hash, preferences_tx));
    } else {
        // Keep the channel open for the whole run
        tokio::spawn(async move { preferences_tx.closed().await });
    }

    let view: Arc<dyn ViewSink> = if cli.json {
        Arc::new(JsonLinesView::new(std::io::stdout()))
    } else {
        Arc::new(LogView)
    };

    let mut session = Session::new(
        Arc::new(dictionary),
        Collaborators {
            fetcher: fetcher.clone(),
            extractor: Arc::new(DefaultExtractor),
            backend: Arc::new(backend),
            deltas,
            view,
            preferences: preferences_rx,
        },
        SessionOptions {
            conflict_action: config.downloads.conflict_action,
            save_as: config.downloads.save_as,
            already_visited_cache: config.session.already_visited_cache,
        },
    );

    for url in &cli.pages {
        match fetch_page(fetcher.as_ref(), url).await {
            Ok(page) => {
                let ids = session.add_page(&page);
                tracing::info!(
                    "{} processors queued for {} ({})",
                    ids.len(),
                    url,
                    page.title.as_deref().unwrap_or("untitled")
                );
            }
            Err(e) => tracing::error!("Skipping page: {}", e),
        }
    }

    if cli.paused {
        session.toggle_pause();
        for processor in session.processors() {
            println!(
                "{}\t{}\t{}",
                processor.id, processor.rule_id, processor.matching_url
            );
        }
        return Ok(());
    }

    session.run().await;

    if !cli.quiet && !cli.json {
        print_statistics(&session.statistics());
    }
    Ok(())
}

/// Polls the config file and publishes changed preferences
async fn watch_config(path: PathBuf, mut hash: String, preferences: watch::Sender<Preferences>) {
    let mut interval = tokio::time::interval(CONFIG_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = preferences.closed() => return,
        }

        match compute_config_hash(&path) {
            Ok(current) if current == hash => continue,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", path.display(), e);
                continue;
            }
        }

        match load_config_with_hash(&path) {
            Ok((config, new_hash)) => {
                hash = new_hash;
                let updated = config.preferences();
                tracing::info!("Configuration changed (hash: {})", hash);
                preferences.send_if_modified(|current| {
                    let modified = *current != updated;
                    *current = updated;
                    modified
                });
            }
            Err(e) => tracing::warn!("Ignoring invalid configuration change: {}", e),
        }
    }
}
