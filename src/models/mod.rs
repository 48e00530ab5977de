use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unified channel record.
///
/// Channel records are created by either the XMLTV parser (metadata, no
/// stream URL) or the playlist parser (stream URL plus whatever tvg-*
/// attributes the playlist carries). Reconciliation merges the two views
/// keyed by `tvg_id`. String fields default to empty rather than `None`
/// so that downstream serving never has to null-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Numeric channel number derived from a purely-numeric display-name,
    /// 0 when the guide carries none.
    pub xui_id: i64,
    pub tvg_id: String,
    pub tvg_name: String,
    pub tvg_logo: String,
    pub group_title: String,
    pub url: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

impl ChannelEntry {
    /// An empty record with the given creation timestamp.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            xui_id: 0,
            tvg_id: String::new(),
            tvg_name: String::new(),
            tvg_logo: String::new(),
            group_title: String::new(),
            url: String::new(),
            country: String::new(),
            created_at,
        }
    }
}

/// A scheduled programme from the XMLTV guide.
///
/// `start`/`stop` are kept both as RFC3339 strings and as truncated epoch
/// seconds; the epoch pair is what the staleness check and downstream
/// time-window queries operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammeEntry {
    pub start: String,
    pub start_ts: i64,
    pub stop: String,
    pub stop_ts: i64,
    /// Foreign key to `ChannelEntry::tvg_id`.
    pub channel: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub subtitle: String,
    /// Raw onscreen episode string, e.g. "S2E27", verbatim when present.
    pub episode_num: String,
    pub season: Option<i64>,
    pub episode: Option<i64>,
    pub icon: String,
    pub image: String,
    pub date: String,
    pub previously_shown: bool,
    pub created_at: DateTime<Utc>,
}

/// Parser output for a full XMLTV document. Transient: consumed once by
/// the orchestrator and not persisted as a unit.
#[derive(Debug, Clone, Default)]
pub struct XmltvDocument {
    pub channels: Vec<ChannelEntry>,
    pub programmes: Vec<ProgrammeEntry>,
}
