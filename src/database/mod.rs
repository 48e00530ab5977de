use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};

pub mod channels;
pub mod programmes;

/// SQLite-backed store for channel and programme collections.
///
/// The ingestion core only needs clear / bulk-insert / list per entity
/// type plus the staleness probe; nothing here performs partial updates.
/// Refresh cycles run sequentially, so the single-writer discipline is
/// provided by the callers.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Create the database file if it doesn't exist (skipped for the
        // in-memory databases used by tests).
        if !config.url.contains(":memory:") && !Sqlite::database_exists(&config.url).await? {
            Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(5))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                xui_id INTEGER NOT NULL DEFAULT 0,
                tvg_id TEXT NOT NULL DEFAULT '',
                tvg_name TEXT NOT NULL DEFAULT '',
                tvg_logo TEXT NOT NULL DEFAULT '',
                group_title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_channels_tvg_id ON channels (tvg_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS programmes (
                start TEXT NOT NULL,
                start_ts INTEGER NOT NULL,
                stop TEXT NOT NULL,
                stop_ts INTEGER NOT NULL,
                channel TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                subtitle TEXT NOT NULL DEFAULT '',
                episode_num TEXT NOT NULL DEFAULT '',
                season INTEGER,
                episode INTEGER,
                icon TEXT NOT NULL DEFAULT '',
                image TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL DEFAULT '',
                previously_shown INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_programmes_channel ON programmes (channel)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_programmes_stop_ts ON programmes (stop_ts)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
