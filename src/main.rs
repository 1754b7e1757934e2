//! # Railwatch: rail disruption watcher
//!
//! Polls the National Rail service indicator feed and posts deduplicated
//! incident and good-service notices to Slack.
//!
//! Usage:
//!   railwatch run                        # Poll until Ctrl-C
//!   railwatch run --dry-run --once       # One tick, log messages instead of sending
//!   railwatch subscribe U123 WAT KGX     # Watch stations for a user
//!   railwatch status                     # Ledger summary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use railwatch_channels::{LogNotifier, SlackNotifier};
use railwatch_core::config::expand_path;
use railwatch_core::types::Subscription;
use railwatch_core::{Notifier, RailwatchConfig};
use railwatch_feed::{NationalRailSource, StationDirectory};
use railwatch_scheduler::{LedgerStore, Poller, spawn_poller};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "railwatch",
    version,
    about = "🚆 Railwatch: rail disruption notices for Slack"
)]
struct Cli {
    /// Config file (default: ~/.railwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start polling
    Run {
        /// Log messages instead of posting them to Slack
        #[arg(long)]
        dry_run: bool,

        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },
    /// Replace a user's watched stations
    Subscribe {
        user_id: String,
        #[arg(required = true)]
        stations: Vec<String>,
    },
    /// Stop watching everything for a user
    Unsubscribe { user_id: String },
    /// List subscribers in poll order
    Subscriptions,
    /// Search stations by name or CRS code
    Stations { query: String },
    /// Show delivery state
    Status,
}

fn init_logging(config: &RailwatchConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.log.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(RailwatchConfig::default_path);
    let config = RailwatchConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_logging(&config, cli.verbose);

    match cli.command {
        Command::Run { dry_run, once } => run(config, dry_run, once).await,
        Command::Subscribe { user_id, stations } => {
            let store = LedgerStore::open(&config)?;
            let subscription = Subscription::from_codes(stations);
            store.registry().save_subscription(&user_id, &subscription).await?;
            println!("✅ {user_id} now watches: {}", subscription.stations.join(", "));
            Ok(())
        }
        Command::Unsubscribe { user_id } => {
            let store = LedgerStore::open(&config)?;
            if store.registry().remove_subscription(&user_id).await? {
                println!("🗑️  Removed subscriptions for {user_id}");
            } else {
                println!("⚠️  {user_id} has no subscriptions");
            }
            Ok(())
        }
        Command::Subscriptions => {
            let store = LedgerStore::open(&config)?;
            let registry = store.registry();
            let user_ids = registry.list_subscriber_ids().await?;
            if user_ids.is_empty() {
                println!("No subscribers.");
            }
            for user_id in user_ids {
                if let Some(subscription) = registry.get_subscription(&user_id).await? {
                    println!("{user_id}: {}", subscription.stations.join(", "));
                }
            }
            Ok(())
        }
        Command::Stations { query } => {
            let directory = StationDirectory::load(
                &config.feed.stations_url,
                Duration::from_secs(config.feed.timeout_secs),
            )
            .await;
            let matches = directory.search(&query);
            if matches.is_empty() {
                println!("No stations match \"{query}\".");
            }
            for station in matches {
                println!("{}  {}", station.crs, station.name);
            }
            Ok(())
        }
        Command::Status => status(&config).await,
    }
}

async fn run(config: RailwatchConfig, dry_run: bool, once: bool) -> Result<()> {
    config.validate(dry_run).context("invalid configuration")?;
    let interval = config.poll_interval()?;

    let store = LedgerStore::open(&config)?;
    tracing::info!("💾 Ledger: {}", store.backend_name());

    let stations = StationDirectory::load(
        &config.feed.stations_url,
        Duration::from_secs(config.feed.timeout_secs),
    )
    .await;
    if stations.is_empty() {
        tracing::warn!("⚠️ Station directory is empty; every station will read as unknown");
    }
    let source = Arc::new(NationalRailSource::new(&config.feed, Arc::new(stations)));

    let notifier: Arc<dyn Notifier> = if dry_run {
        tracing::info!("🧪 Dry run: messages are logged, not sent");
        Arc::new(LogNotifier)
    } else {
        if !config.slack.team_id.is_empty() {
            tracing::info!("💬 Slack team: {}", config.slack.team_id);
        }
        Arc::new(SlackNotifier::new(&config.slack))
    };

    let mut poller = Poller::new(source, notifier, store.ledger(), store.registry());
    if let Some((channel_id, station_code)) = config.global_target() {
        tracing::info!("🌐 Global monitoring: {station_code} → {channel_id}");
        poller = poller.with_global_target(&channel_id, &station_code);
    }

    if once {
        let report = poller.run_tick().await;
        println!(
            "Tick complete: {} target(s), {} notification(s) sent, {} failed send(s), {} source failure(s), {} ledger failure(s)",
            report.targets,
            report.notifications_sent,
            report.failed_sends,
            report.source_failures,
            report.ledger_failures
        );
        return Ok(());
    }

    let handle = spawn_poller(Arc::new(poller), interval);
    tokio::signal::ctrl_c().await?;
    handle.abort();
    tracing::info!("👋 Shutting down");
    Ok(())
}

async fn status(config: &RailwatchConfig) -> Result<()> {
    let store = LedgerStore::open(config)?;
    println!("Ledger backend:   {}", store.backend_name());
    println!("Posted incidents: {}", store.posted_count().await?);

    let mut targets = Vec::new();
    if let Some((channel_id, station_code)) = config.global_target() {
        targets.push((channel_id, station_code));
    }
    let registry = store.registry();
    for user_id in registry.list_subscriber_ids().await? {
        if let Some(subscription) = registry.get_subscription(&user_id).await? {
            targets.extend(subscription.stations.into_iter().map(|s| (user_id.clone(), s)));
        }
    }

    for (destination_id, station_code) in targets {
        let state = match store.good_service_record(&destination_id, &station_code).await? {
            Some(record) => format!(
                "{} since {}",
                record.status.as_str(),
                record.posted_at.to_rfc3339()
            ),
            None => "-".to_string(),
        };
        println!("{station_code}@{destination_id}: {state}");
    }
    Ok(())
}
