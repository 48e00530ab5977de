use anyhow::Result;
use sqlx::Row;
use tracing::debug;

use super::Database;
use crate::models::ProgrammeEntry;
use crate::utils::parse_datetime;

// Programme rows bind 17 fields each; stay well under SQLite's 32766
// bound-variable limit.
const PROGRAMME_BATCH_SIZE: usize = 1500;

impl Database {
    pub async fn clear_programmes(&self) -> Result<()> {
        sqlx::query("DELETE FROM programmes")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_programmes(&self, programmes: &[ProgrammeEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_programmes(&mut tx, programmes).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace the entire programme collection in a single transaction.
    pub async fn replace_programmes(&self, programmes: &[ProgrammeEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM programmes")
            .execute(&mut *tx)
            .await?;
        Self::insert_programmes(&mut tx, programmes).await?;
        tx.commit().await?;
        debug!("Replaced programme set with {} entries", programmes.len());
        Ok(())
    }

    async fn insert_programmes(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        programmes: &[ProgrammeEntry],
    ) -> Result<()> {
        for chunk in programmes.chunks(PROGRAMME_BATCH_SIZE) {
            if chunk.is_empty() {
                continue;
            }

            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO programmes (start, start_ts, stop, stop_ts, channel, title, description, category, subtitle, episode_num, season, episode, icon, image, date, previously_shown, created_at) ",
            );

            query_builder.push_values(chunk, |mut b, programme| {
                b.push_bind(&programme.start)
                    .push_bind(programme.start_ts)
                    .push_bind(&programme.stop)
                    .push_bind(programme.stop_ts)
                    .push_bind(&programme.channel)
                    .push_bind(&programme.title)
                    .push_bind(&programme.description)
                    .push_bind(&programme.category)
                    .push_bind(&programme.subtitle)
                    .push_bind(&programme.episode_num)
                    .push_bind(programme.season)
                    .push_bind(programme.episode)
                    .push_bind(&programme.icon)
                    .push_bind(&programme.image)
                    .push_bind(&programme.date)
                    .push_bind(programme.previously_shown)
                    .push_bind(programme.created_at.to_rfc3339());
            });

            query_builder.build().execute(&mut **tx).await?;
        }
        Ok(())
    }

    pub async fn get_programme_entries(&self) -> Result<Vec<ProgrammeEntry>> {
        let rows = sqlx::query(
            "SELECT start, start_ts, stop, stop_ts, channel, title, description, category, subtitle, episode_num, season, episode, icon, image, date, previously_shown, created_at FROM programmes",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut programmes = Vec::with_capacity(rows.len());
        for row in rows {
            programmes.push(ProgrammeEntry {
                start: row.get("start"),
                start_ts: row.get("start_ts"),
                stop: row.get("stop"),
                stop_ts: row.get("stop_ts"),
                channel: row.get("channel"),
                title: row.get("title"),
                description: row.get("description"),
                category: row.get("category"),
                subtitle: row.get("subtitle"),
                episode_num: row.get("episode_num"),
                season: row.get("season"),
                episode: row.get("episode"),
                icon: row.get("icon"),
                image: row.get("image"),
                date: row.get("date"),
                previously_shown: row.get("previously_shown"),
                created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
            });
        }
        Ok(programmes)
    }

    /// Latest stop time (epoch seconds) across all stored programmes;
    /// `None` when the collection is empty. This is what the staleness
    /// oracle inspects.
    pub async fn max_programme_stop(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(stop_ts) AS max_stop FROM programmes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<Option<i64>, _>("max_stop"))
    }
}
