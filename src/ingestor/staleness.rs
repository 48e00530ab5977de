//! Guide staleness check.
//!
//! Decides whether the stored programme data still covers enough of the
//! future to skip a refetch. Gates only the XMLTV fill; the playlist
//! fill supplies URLs, not timing, and always runs.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::database::Database;

pub struct StalenessOracle {
    database: Database,
    horizon: Duration,
}

impl StalenessOracle {
    pub fn new(database: Database, horizon_hours: i64) -> Self {
        Self {
            database,
            horizon: Duration::hours(horizon_hours),
        }
    }

    /// True when the stored programme set no longer covers now plus the
    /// configured forward horizon (or is empty).
    pub async fn is_stale(&self) -> Result<bool> {
        let max_stop = self.database.max_programme_stop().await?;
        let stale = is_stale_at(max_stop, Utc::now(), self.horizon);

        match max_stop {
            None => info!("No stored programme data, guide refresh required"),
            Some(ts) => {
                let coverage_end = DateTime::<Utc>::from_timestamp(ts, 0)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| ts.to_string());
                if stale {
                    info!(
                        "Stored guide coverage ends at {}, inside the {}h horizon; refresh required",
                        coverage_end,
                        self.horizon.num_hours()
                    );
                } else {
                    debug!(
                        "Stored guide coverage ends at {}, beyond the {}h horizon; refresh not needed",
                        coverage_end,
                        self.horizon.num_hours()
                    );
                }
            }
        }

        Ok(stale)
    }
}

/// Pure staleness decision, split out for testability.
fn is_stale_at(max_stop_ts: Option<i64>, now: DateTime<Utc>, horizon: Duration) -> bool {
    match max_stop_ts {
        None => true,
        Some(ts) => ts < (now + horizon).timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_is_stale() {
        assert!(is_stale_at(None, Utc::now(), Duration::hours(12)));
    }

    #[test]
    fn test_coverage_in_the_past_is_stale() {
        let now = Utc::now();
        let past = (now - Duration::hours(2)).timestamp();
        assert!(is_stale_at(Some(past), now, Duration::hours(12)));
    }

    #[test]
    fn test_coverage_inside_horizon_is_stale() {
        let now = Utc::now();
        let soon = (now + Duration::hours(3)).timestamp();
        assert!(is_stale_at(Some(soon), now, Duration::hours(12)));
    }

    #[test]
    fn test_coverage_beyond_horizon_is_fresh() {
        let now = Utc::now();
        let far = (now + Duration::hours(36)).timestamp();
        assert!(!is_stale_at(Some(far), now, Duration::hours(12)));
    }
}
