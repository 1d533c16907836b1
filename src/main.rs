use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use sitewatch::config::Config;
use sitewatch::feed::{self, ChangeBatch, ContentKind, FeedManager, HttpFetcher, RemoveError};
use sitewatch::sitemap::{RegexExtractor, SitemapExtractor};
use sitewatch::storage::{SqliteStore, StoreError};
use sitewatch::util::{date_stamp, parse_date_stamp};

/// Get the config directory path (~/.config/sitewatch/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("sitewatch"))
}

#[derive(Parser, Debug)]
#[command(name = "sitewatch", about = "Watch sitemaps for newly published URLs")]
struct Args {
    /// Config file (defaults to ~/.config/sitewatch/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List monitored sitemaps
    List,
    /// Check a sitemap and start monitoring it
    Add {
        url: String,
        /// Fetch even if already checked today
        #[arg(long)]
        force: bool,
    },
    /// Stop monitoring a sitemap
    Remove { url: String },
    /// Run one check pass and print the change batch as JSON
    Check,
    /// Run check passes on the configured interval until interrupted
    Watch,
    /// Print stored content for a sitemap
    Show {
        url: String,
        #[arg(long, value_enum, default_value_t = Kind::Current)]
        kind: Kind,
        /// Archive day as YYYYMMDD. Without it, archived days are listed.
        #[arg(long, value_name = "YYYYMMDD")]
        date: Option<String>,
        /// How many days back to look when listing archived days
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Run the sitemap scanner on a local file
    Extract { file: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Current,
    Previous,
    Archive,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Logs go to stderr so `check` output stays machine-readable
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let manager = match &args.command {
        Command::Extract { file } => return extract_file(file),
        _ => open_manager(&config, &config_dir).await?,
    };

    match args.command {
        Command::List => {
            for url in manager.list_feeds().await {
                println!("{url}");
            }
        }
        Command::Add { url, force } => {
            let result = manager.add_feed(&url, force).await;
            if !result.outcome.is_success() {
                anyhow::bail!("{}: {}", result.url, result.outcome.message());
            }
            println!("{}: {}", result.url, result.outcome.message());
            if result.added {
                println!("Now monitoring {}", result.url);
            }
            for child in result.new_feeds_added() {
                println!("  + {child}");
            }
            for new_url in result.outcome.new_urls() {
                println!("  {new_url}");
            }
        }
        Command::Remove { url } => match manager.remove_feed(&url).await {
            Ok(()) => println!("Removed {url}"),
            Err(RemoveError::NotFound(url)) => anyhow::bail!("Not monitoring {url}"),
            Err(e) => return Err(e).context("Failed to remove feed"),
        },
        Command::Check => {
            let batch = feed::run_check_pass(&manager, config.feed_delay()).await;
            print_batch(&batch)?;
        }
        Command::Watch => match config.watch_interval() {
            None => {
                let batch = feed::run_check_pass(&manager, config.feed_delay()).await;
                print_batch(&batch)?;
            }
            Some(interval) => {
                tracing::info!(interval_secs = interval.as_secs(), "Watching sitemaps");
                let on_batch = |batch: ChangeBatch| {
                    if let Err(e) = print_batch(&batch) {
                        tracing::warn!(error = %e, "Failed to write change batch");
                    }
                };
                tokio::select! {
                    _ = feed::watch(&manager, config.feed_delay(), interval, on_batch) => {}
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted, stopping");
                    }
                }
            }
        },
        Command::Show {
            url,
            kind,
            date,
            days,
        } => {
            let kind = match kind {
                Kind::Current => ContentKind::Current,
                Kind::Previous => ContentKind::Previous,
                Kind::Archive => match date.as_deref() {
                    Some(stamp) => ContentKind::Archive(
                        parse_date_stamp(stamp)
                            .with_context(|| format!("Invalid date '{stamp}', expected YYYYMMDD"))?,
                    ),
                    None => {
                        let dates = manager.archive_dates(&url, days).await;
                        if dates.is_empty() {
                            anyhow::bail!("No archived content for {url} in the last {days} days");
                        }
                        for date in dates {
                            println!("{}", date_stamp(date));
                        }
                        return Ok(());
                    }
                },
            };
            match manager.get_content(&url, kind).await {
                Some(content) => println!("{content}"),
                None => anyhow::bail!("No stored content for {url}"),
            }
        }
        Command::Extract { file } => extract_file(&file)?,
    }

    Ok(())
}

async fn open_manager(config: &Config, config_dir: &std::path::Path) -> Result<FeedManager> {
    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
            }
            config_dir.join("sitewatch.db")
        }
    };

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let store = match SqliteStore::open(db_path_str).await {
        Ok(store) => store,
        Err(StoreError::InstanceLocked) => {
            eprintln!("Error: Another sitewatch process is using {}.", db_path.display());
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let fetcher = HttpFetcher::new(
        &config.user_agent,
        config.request_timeout(),
        config.max_sitemap_bytes,
    )
    .context("Failed to build HTTP client")?;

    Ok(FeedManager::new(Arc::new(store), Arc::new(fetcher)).with_settings(config.manager_settings()))
}

fn print_batch(batch: &ChangeBatch) -> Result<()> {
    let json = serde_json::to_string_pretty(batch).context("Failed to serialize change batch")?;
    println!("{json}");
    Ok(())
}

fn extract_file(file: &std::path::Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let extractor = RegexExtractor::new();

    println!("root: {}", extractor.classify_root(&content));
    println!("valid: {}", extractor.is_valid_sitemap(&content));
    for child in extractor.child_sitemaps(&content) {
        println!("sitemap\t{child}");
    }
    for entry in extractor.url_entries(&content) {
        println!("url\t{}\t{}", entry.url, entry.lastmod.as_deref().unwrap_or("-"));
    }
    Ok(())
}
