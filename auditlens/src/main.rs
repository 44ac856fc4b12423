//! auditlens - classified activity log summaries from the terminal
//!
//! Fetches the upstream activity log for a time window, classifies it, and
//! prints either aggregate statistics or a filtered, paged entry listing.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/auditlens/auditlens.log (~/.local/state/auditlens/auditlens.log)
//! - Config: $XDG_CONFIG_HOME/auditlens/config.toml (~/.config/auditlens/config.toml)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auditlens_core::analytics::{self, Paginator};
use auditlens_core::{CacheEntry, Category, Config, HttpLogSource, LogCache, RuleCatalog};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(name = "auditlens")]
#[command(about = "Classified activity log summaries from the upstream admin API")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate statistics for a time window
    Summary {
        /// Time window in days
        #[arg(short, long, default_value = "3")]
        days: u32,

        /// Emit statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classified entries, filtered and paged
    Logs {
        /// Time window in days
        #[arg(short, long, default_value = "3")]
        days: u32,

        /// Keep only entries of one category (e.g. failed_login)
        #[arg(short, long)]
        category: Option<String>,

        /// Free-text search over message, source, detail and actor id
        #[arg(short, long)]
        search: Option<String>,

        /// Page to show (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Entries per page
        #[arg(long, default_value = "50")]
        page_size: usize,

        /// Emit the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch a window, printing a summary line whenever it refreshes
    Watch {
        /// Time window in days
        #[arg(short, long, default_value = "3")]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        auditlens_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("auditlens starting");

    let cache = LogCache::from_config(&config).context("failed to set up the log source")?;

    match args.command {
        Command::Summary { days, json } => summary(&cache, days, json).await,
        Command::Logs {
            days,
            category,
            search,
            page,
            page_size,
            json,
        } => logs(&cache, days, category, search, page, page_size, json).await,
        Command::Watch { days } => watch(&cache, days).await,
    }
}

/// Keep a window subscribed and report each background refresh until Ctrl-C.
async fn watch(cache: &LogCache<HttpLogSource>, days: u32) -> Result<()> {
    let _subscription = cache.subscribe(days);
    let maintenance = cache.spawn_maintenance();

    let window = load_window(cache, days).await?;
    let mut last_refreshed = window.refreshed_at;
    print_watch_line(&window);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                let window = cache.get(days).await?;
                if window.refreshed_at != last_refreshed {
                    last_refreshed = window.refreshed_at;
                    print_watch_line(&window);
                }
            }
        }
    }

    maintenance.abort();
    Ok(())
}

fn print_watch_line(window: &CacheEntry) {
    let stats = &window.statistics;
    println!(
        "{}  total={} errors={} failed_logins={} sign_ins={} emails={} viewed={}{}",
        window
            .refreshed_at
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S"),
        stats.total,
        stats.system_errors,
        stats.failed_logins,
        stats.successful_logins,
        stats.emails_sent,
        stats.persons_viewed,
        if window.was_limited { " (limited)" } else { "" }
    );
}

/// Load a window behind a spinner; the fetch can take a while on big windows.
async fn load_window(cache: &LogCache<HttpLogSource>, days: u32) -> Result<Arc<CacheEntry>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Fetching activity log for the last {} day(s)...", days));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let window = cache
        .get(days)
        .await
        .context("failed to load the activity log")?;

    spinner.finish_and_clear();
    Ok(window)
}

async fn summary(cache: &LogCache<HttpLogSource>, days: u32, json: bool) -> Result<()> {
    let window = load_window(cache, days).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&window.statistics)?);
        return Ok(());
    }

    let catalog = RuleCatalog::standard();
    let stats = &window.statistics;

    println!(
        "Activity log, last {} day(s) ({} entries)",
        window.actual_window_days, stats.total
    );
    if let Some(reason) = &window.limit_reason {
        println!("Note: {}", reason);
    }
    println!();

    for category in catalog.categories() {
        let Some(count) = stats.count_for(category) else {
            continue;
        };
        println!(
            "{:>6}  {} {}",
            count,
            catalog.icon(category),
            catalog.display_name(category)
        );
    }
    let classified: usize = catalog
        .categories()
        .iter()
        .filter_map(|c| stats.count_for(*c))
        .sum();
    println!("{:>6}  other", stats.total - classified);
    println!();
    println!(
        "Refreshed {}",
        window
            .refreshed_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );

    Ok(())
}

async fn logs(
    cache: &LogCache<HttpLogSource>,
    days: u32,
    category: Option<String>,
    search: Option<String>,
    page: usize,
    page_size: usize,
    json: bool,
) -> Result<()> {
    let category = category
        .map(|raw| raw.parse::<Category>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let window = load_window(cache, days).await?;

    // Pure post-filters over the cached, classified set
    let mut entries = window.entries.clone();
    if let Some(category) = category {
        entries = analytics::filter_by_category(&entries, category);
    }
    if let Some(term) = &search {
        entries = analytics::filter_by_search(&entries, term);
    }

    let mut pager = Paginator::new(entries.len(), page_size);
    pager.go_to_page(page);
    let page_entries = pager.page_of(&entries);

    if json {
        println!("{}", serde_json::to_string_pretty(page_entries)?);
        return Ok(());
    }

    if let Some(reason) = &window.limit_reason {
        println!("Note: {}", reason);
    }
    println!(
        "{} matching entries, page {}/{}",
        entries.len(),
        pager.current_page(),
        pager.total_pages()
    );
    println!();

    let catalog = RuleCatalog::standard();
    for entry in page_entries {
        let local = entry.timestamp.with_timezone(&chrono::Local);
        println!(
            "{} {:7} {} {}",
            local.format("%Y-%m-%d %H:%M:%S"),
            entry.severity.as_str(),
            catalog.icon(entry.category),
            entry.message
        );
        if let Some(detail) = &entry.detail {
            println!("{:30}{}", "", detail);
        }
    }

    Ok(())
}
