use anyhow::Result;
use sqlx::Row;
use tracing::debug;

use super::Database;
use crate::models::ChannelEntry;
use crate::utils::parse_datetime;

// SQLite allows 32766 bound variables per statement; channel rows bind
// 8 fields each.
const CHANNEL_BATCH_SIZE: usize = 2000;

impl Database {
    pub async fn clear_channels(&self) -> Result<()> {
        sqlx::query("DELETE FROM channels")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_channels(&self, channels: &[ChannelEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_channels(&mut tx, channels).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace the entire channel collection in a single transaction.
    pub async fn replace_channels(&self, channels: &[ChannelEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM channels").execute(&mut *tx).await?;
        Self::insert_channels(&mut tx, channels).await?;
        tx.commit().await?;
        debug!("Replaced channel set with {} entries", channels.len());
        Ok(())
    }

    async fn insert_channels(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        channels: &[ChannelEntry],
    ) -> Result<()> {
        for chunk in channels.chunks(CHANNEL_BATCH_SIZE) {
            if chunk.is_empty() {
                continue;
            }

            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO channels (xui_id, tvg_id, tvg_name, tvg_logo, group_title, url, country, created_at) ",
            );

            query_builder.push_values(chunk, |mut b, channel| {
                b.push_bind(channel.xui_id)
                    .push_bind(&channel.tvg_id)
                    .push_bind(&channel.tvg_name)
                    .push_bind(&channel.tvg_logo)
                    .push_bind(&channel.group_title)
                    .push_bind(&channel.url)
                    .push_bind(&channel.country)
                    .push_bind(channel.created_at.to_rfc3339());
            });

            query_builder.build().execute(&mut **tx).await?;
        }
        Ok(())
    }

    pub async fn get_channel_entries(&self) -> Result<Vec<ChannelEntry>> {
        let rows = sqlx::query(
            "SELECT xui_id, tvg_id, tvg_name, tvg_logo, group_title, url, country, created_at FROM channels",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut channels = Vec::with_capacity(rows.len());
        for row in rows {
            channels.push(ChannelEntry {
                xui_id: row.get("xui_id"),
                tvg_id: row.get("tvg_id"),
                tvg_name: row.get("tvg_name"),
                tvg_logo: row.get("tvg_logo"),
                group_title: row.get("group_title"),
                url: row.get("url"),
                country: row.get("country"),
                created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
            });
        }
        Ok(channels)
    }
}
