use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_sync::{
    cache::FileCache,
    config::Config,
    database::Database,
    ingestor::{scheduler, IngestorService},
};

#[derive(Parser)]
#[command(name = "epg-sync")]
#[command(version)]
#[command(about = "EPG and channel-list ingestion service for IPTV aggregation")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// XMLTV guide URL (overrides config file)
    #[arg(long, value_name = "URL")]
    xmltv_url: Option<String>,

    /// M3U playlist URL (overrides config file)
    #[arg(long, value_name = "URL")]
    playlist_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("epg_sync={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EPG sync service v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(xmltv_url) = cli.xmltv_url {
        config.ingestion.xmltv_url = xmltv_url;
    }
    if let Some(playlist_url) = cli.playlist_url {
        config.ingestion.playlist_url = Some(playlist_url);
    }

    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and schema applied");

    let cache = FileCache::new(config.storage.cache_path.clone());
    let ingestor = Arc::new(IngestorService::new(
        config.ingestion.clone(),
        database,
        cache,
    ));

    // Startup fill: staleness-gated guide refresh plus playlist refresh,
    // then hand the service over to the periodic scheduler.
    ingestor.refresh(false).await;

    let scheduler_handle =
        scheduler::schedule_refresh(ingestor.clone(), &config.ingestion.update_cron)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping scheduler");
    scheduler_handle.stop();
    scheduler_handle.join().await;

    Ok(())
}
