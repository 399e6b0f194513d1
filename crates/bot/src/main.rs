//! Almanac Digest Worker
//!
//! Daily delivery of literary calendar events:
//! 1. Polls the clock at minute granularity
//! 2. At the configured local hour, reads the day's events from the store
//! 3. Enriches each event with catalog books and links
//! 4. Delivers the digest through the messaging transport
//!
//! One-shot modes: `send-now` (today's digest immediately) and
//! `jubilees <year>` (the year report).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use almanac_common::cache::CatalogCache;
use almanac_common::catalog::HttpCatalog;
use almanac_common::config::AppConfig;
use almanac_common::metrics::register_metrics;
use almanac_common::store::{EventStore, SqliteStore};
use almanac_common::transport::create_transport;
use almanac_digest::{Dispatcher, Enricher, JubileeReporter, LinkBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting Almanac digest worker v{}", almanac_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    if config.bot.chat_id.is_empty() {
        warn!("No chat_id configured; digests will have no destination");
    }

    // Initialize metrics
    register_metrics();
    if config.observability.metrics_port > 0 {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .install()?;
        info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }

    // Open the event store
    info!("Opening event store...");
    let store = SqliteStore::connect(&config.store).await?;
    store.init_schema().await?;

    // Wire the pipeline: cache -> catalog -> enricher -> dispatcher
    let cache = Arc::new(CatalogCache::new());
    let catalog = Arc::new(HttpCatalog::new(&config.catalog, cache)?);
    let transport = create_transport(&config.bot)?;

    let links = LinkBuilder::new(config.catalog.site_base.clone());
    let enricher = Enricher::new(catalog, links.clone());
    let dispatcher = Dispatcher::new(
        transport.clone(),
        enricher,
        links.clone(),
        config.delivery.clone(),
    );
    let reporter = JubileeReporter::new(transport, links, config.delivery.retry_policy());

    // One-shot modes
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("send-now") => {
            run_digest(&store, &dispatcher, &config).await?;
            return Ok(());
        }
        Some("jubilees") => {
            let year = args
                .get(2)
                .and_then(|y| y.parse::<i32>().ok())
                .unwrap_or_else(|| local_now(&config).year());
            let records = store.jubilees_for_year(year).await?;
            reporter
                .send_year_report(&config.bot.chat_id, year, &records)
                .await?;
            return Ok(());
        }
        Some(other) => {
            error!(mode = other, "Unknown mode; expected 'send-now' or 'jubilees <year>'");
            std::process::exit(1);
        }
        None => {}
    }

    // Service mode: minute-granularity schedule; shutdown interrupts any
    // pending sleep, never a partially-sent event.
    info!(
        send_hour = config.bot.send_hour,
        "Digest worker ready, entering daily schedule"
    );

    let mut last_sent: Option<NaiveDate> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(60)) => {
                let now = local_now(&config);
                let today = now.date_naive();
                if now.hour() == config.bot.send_hour && last_sent != Some(today) {
                    if let Err(e) = run_digest(&store, &dispatcher, &config).await {
                        error!(error = %e, "Digest run failed");
                    }
                    last_sent = Some(today);
                }
            }
        }
    }

    info!("Digest worker shutting down");
    Ok(())
}

/// Fetch and deliver today's digest
async fn run_digest(
    store: &SqliteStore,
    dispatcher: &Dispatcher,
    config: &AppConfig,
) -> almanac_common::Result<()> {
    let today = local_now(config).date_naive();
    let events = store.events_for_date(today.month(), today.day()).await?;
    info!(date = %today, count = events.len(), "Sending daily digest");

    let summary = dispatcher
        .send_daily_digest(&config.bot.chat_id, &events, today)
        .await;
    info!(
        sent = summary.sent,
        failed = summary.failed,
        skipped = summary.skipped,
        "Digest run complete"
    );
    Ok(())
}

fn local_now(config: &AppConfig) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&config.bot.timezone_offset())
}
