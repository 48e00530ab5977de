//! Refresh orchestration.
//!
//! A refresh cycle is a strictly sequential pipeline: guide fill (gated
//! by the staleness check unless forced), playlist fill, cache purge.
//! Failures in one fill step never abort the other or the process; a
//! failed step simply produces nothing new, leaving prior store content
//! untouched for that entity type.

use anyhow::{Context, Result};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod ingest_playlist;
pub mod ingest_xmltv;
pub mod reconcile;
pub mod scheduler;
pub mod staleness;

pub use ingest_playlist::PlaylistIngestor;
pub use ingest_xmltv::XmltvIngestor;
pub use reconcile::{merge_guide_channels, reconcile};
pub use staleness::StalenessOracle;

use crate::cache::{FileCache, PLAYLIST_CACHE_FILE, XMLTV_CACHE_FILE};
use crate::config::IngestionConfig;
use crate::database::Database;
use crate::fetch::{Fetcher, RetryConfig};
use crate::utils::normalize_url_scheme;

/// Orchestrates guide and playlist ingestion against the store.
pub struct IngestorService {
    config: IngestionConfig,
    database: Database,
    cache: FileCache,
    fetcher: Fetcher,
    xmltv: XmltvIngestor,
    playlist: PlaylistIngestor,
    staleness: StalenessOracle,
    // Cycles never overlap; a trigger that arrives mid-cycle is skipped.
    cycle_lock: Mutex<()>,
}

impl IngestorService {
    pub fn new(config: IngestionConfig, database: Database, cache: FileCache) -> Self {
        let retry = RetryConfig::from_ingestion_config(&config);
        let timeout = std::time::Duration::from_secs(config.fetch_timeout_secs);
        let fetcher = Fetcher::new(cache.clone(), retry, timeout);
        let xmltv = XmltvIngestor::new(&config.timezone, config.stream_url_template.clone());
        let staleness = StalenessOracle::new(database.clone(), config.staleness_horizon_hours);

        Self {
            config,
            database,
            cache,
            fetcher,
            xmltv,
            playlist: PlaylistIngestor::new(),
            staleness,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one refresh cycle. Startup passes `force = false` (staleness
    /// gated, full channel derivation); scheduled runs pass `force = true`.
    pub async fn refresh(&self, force: bool) {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("A refresh cycle is already running, skipping this trigger");
            return;
        };

        let cycle_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Starting refresh cycle {} (forced: {})", cycle_id, force);

        if let Err(e) = self.fill_from_xmltv(force).await {
            error!("Guide fill failed, prior guide data is kept: {:#}", e);
        }

        if let Err(e) = self.fill_from_playlist(force).await {
            error!("Playlist fill failed, prior channel data is kept: {:#}", e);
        }

        self.cache.clear().await;

        info!(
            "Refresh cycle {} finished in {:.1?}",
            cycle_id,
            started.elapsed()
        );
    }

    /// Fetch and ingest the XMLTV guide. Unforced runs consult the
    /// staleness oracle first; unforced (startup) runs also re-derive the
    /// channel set, while forced scheduled runs refresh programmes only.
    async fn fill_from_xmltv(&self, force: bool) -> Result<()> {
        if !force
            && !self
                .staleness
                .is_stale()
                .await
                .context("staleness check")?
        {
            info!("Stored guide data is fresh enough, skipping XMLTV fetch");
            return Ok(());
        }

        let url = normalize_url_scheme(&self.config.xmltv_url);
        let Some(content) = self.fetcher.fetch(&url, XMLTV_CACHE_FILE, force).await else {
            // Exhaustion is already logged; dependent writes are skipped.
            return Ok(());
        };

        let path = self
            .cache
            .write(XMLTV_CACHE_FILE, &content)
            .await
            .context("writing guide to cache")?;
        drop(content);

        if force {
            let programmes = self.xmltv.parse_xmltv(&path)?;
            self.database
                .replace_programmes(&programmes)
                .await
                .context("storing programmes")?;
            info!("Stored {} programmes", programmes.len());
        } else {
            let doc = self.xmltv.parse_xmltv_full(&path)?;

            let existing = self
                .database
                .get_channel_entries()
                .await
                .context("loading current channels")?;
            let merged = merge_guide_channels(existing, doc.channels);
            self.database
                .replace_channels(&merged)
                .await
                .context("storing channels")?;

            self.database
                .replace_programmes(&doc.programmes)
                .await
                .context("storing programmes")?;
            info!(
                "Stored {} channels and {} programmes",
                merged.len(),
                doc.programmes.len()
            );
        }

        Ok(())
    }

    /// Fetch the playlist and reconcile its stream URLs into the stored
    /// channel set. Runs regardless of guide staleness.
    async fn fill_from_playlist(&self, force: bool) -> Result<()> {
        let Some(playlist_url) = &self.config.playlist_url else {
            info!("No playlist source configured, skipping playlist fill");
            return Ok(());
        };

        let url = normalize_url_scheme(playlist_url);
        let Some(content) = self.fetcher.fetch(&url, PLAYLIST_CACHE_FILE, force).await else {
            return Ok(());
        };

        self.cache
            .write(PLAYLIST_CACHE_FILE, &content)
            .await
            .context("writing playlist to cache")?;

        let text = String::from_utf8_lossy(&content);
        let playlist_channels = self.playlist.parse(&text);
        drop(text);

        let existing = self
            .database
            .get_channel_entries()
            .await
            .context("loading current channels")?;
        let merged = reconcile(existing, playlist_channels);

        self.database
            .replace_channels(&merged)
            .await
            .context("storing reconciled channels")?;
        info!("Stored {} reconciled channels", merged.len());

        Ok(())
    }
}
