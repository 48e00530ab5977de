use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the downloaded guide/playlist files between the
    /// fetch and parse stages of a refresh cycle.
    pub cache_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// XMLTV guide source.
    pub xmltv_url: String,
    /// M3U playlist source; absence disables playlist ingestion.
    pub playlist_url: Option<String>,
    /// Template with a `{channel}` placeholder used to derive stream URLs
    /// from numeric channel numbers; absence disables derivation.
    pub stream_url_template: Option<String>,
    /// Cron expression evaluated for scheduled forced refreshes.
    pub update_cron: String,
    /// Stored programme data must cover now plus this many hours forward,
    /// otherwise the guide is considered stale.
    pub staleness_horizon_hours: i64,
    /// Fallback timezone for XMLTV timestamps that carry no UTC offset.
    pub timezone: String,
    pub fetch_max_attempts: u32,
    pub fetch_initial_delay_ms: u64,
    pub fetch_max_delay_ms: u64,
    pub fetch_backoff_multiplier: f64,
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./epg-sync.db".to_string(),
                max_connections: Some(5),
            },
            storage: StorageConfig {
                cache_path: PathBuf::from("./data/cache"),
            },
            ingestion: IngestionConfig {
                xmltv_url: "http://localhost/xmltv.xml".to_string(),
                playlist_url: None,
                stream_url_template: None,
                update_cron: "0 0 */12 * * *".to_string(),
                staleness_horizon_hours: 12,
                timezone: "UTC".to_string(),
                fetch_max_attempts: 3,
                fetch_initial_delay_ms: 500,
                fetch_max_delay_ms: 10_000,
                fetch_backoff_multiplier: 2.0,
                fetch_timeout_secs: 30,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all("./data/cache")?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.database.url, config.database.url);
        assert_eq!(parsed.ingestion.update_cron, config.ingestion.update_cron);
        assert!(parsed.ingestion.playlist_url.is_none());
    }
}
