//! Channel reconciliation.
//!
//! Merges playlist-derived channel records (stream URLs plus partial
//! metadata) into the guide-derived channel set, keyed by `tvg_id`.
//! The merged set fully replaces the stored channel collection.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::ChannelEntry;

/// Merge playlist channels into the existing channel set.
///
/// Matching records have their `url` overwritten unconditionally;
/// `group_title` and `country` are overwritten only when the playlist
/// value is non-empty, so guide-sourced metadata survives a playlist
/// that omits it. Unmatched playlist records are inserted. Existing
/// records that nothing in the playlist references are retained.
/// Output order is not significant.
pub fn reconcile(
    existing_channels: Vec<ChannelEntry>,
    playlist_channels: Vec<ChannelEntry>,
) -> Vec<ChannelEntry> {
    let existing_count = existing_channels.len();
    let playlist_count = playlist_channels.len();

    let mut merged: HashMap<String, ChannelEntry> = HashMap::with_capacity(existing_count);
    for (position, channel) in existing_channels.into_iter().enumerate() {
        merged.insert(entry_key(&channel, "existing", position), channel);
    }

    let mut matched = 0usize;
    let mut inserted = 0usize;

    for (position, playlist_channel) in playlist_channels.into_iter().enumerate() {
        let key = entry_key(&playlist_channel, "playlist", position);

        let is_match = !playlist_channel.tvg_id.is_empty() && merged.contains_key(&key);
        if is_match {
            if let Some(channel) = merged.get_mut(&key) {
                channel.url = playlist_channel.url;
                if !playlist_channel.group_title.is_empty() {
                    channel.group_title = playlist_channel.group_title;
                }
                if !playlist_channel.country.is_empty() {
                    channel.country = playlist_channel.country;
                }
                matched += 1;
            }
        } else {
            debug!(
                "Playlist channel '{}' has no guide counterpart, adding it",
                if playlist_channel.tvg_id.is_empty() {
                    &playlist_channel.tvg_name
                } else {
                    &playlist_channel.tvg_id
                }
            );
            merged.insert(key, playlist_channel);
            inserted += 1;
        }
    }

    info!(
        "Reconciled channels: {} existing, {} from playlist ({} matched, {} new), {} total",
        existing_count,
        playlist_count,
        matched,
        inserted,
        merged.len()
    );

    merged.into_values().collect()
}

/// Merge freshly parsed guide channels into the existing channel set.
///
/// The guide is authoritative for metadata (name, number, logo) but a
/// stream URL already learned from the playlist survives a guide entry
/// that derives none. Existing records the guide no longer mentions are
/// retained, mirroring [`reconcile`].
pub fn merge_guide_channels(
    existing_channels: Vec<ChannelEntry>,
    guide_channels: Vec<ChannelEntry>,
) -> Vec<ChannelEntry> {
    let mut merged: HashMap<String, ChannelEntry> =
        HashMap::with_capacity(existing_channels.len());
    for (position, channel) in existing_channels.into_iter().enumerate() {
        merged.insert(entry_key(&channel, "existing", position), channel);
    }

    for (position, guide_channel) in guide_channels.into_iter().enumerate() {
        let key = entry_key(&guide_channel, "guide", position);
        if merged.contains_key(&key) {
            if let Some(channel) = merged.get_mut(&key) {
                channel.tvg_name = guide_channel.tvg_name;
                channel.xui_id = guide_channel.xui_id;
                if !guide_channel.tvg_logo.is_empty() {
                    channel.tvg_logo = guide_channel.tvg_logo;
                }
                if !guide_channel.url.is_empty() {
                    channel.url = guide_channel.url;
                }
            }
        } else {
            merged.insert(key, guide_channel);
        }
    }

    merged.into_values().collect()
}

/// Reconciliation key: `tvg_id`, falling back to `tvg_name`, falling
/// back to a synthetic per-batch ordinal. The batch tag keeps synthetic
/// keys from colliding across the two input sets.
fn entry_key(channel: &ChannelEntry, batch: &str, position: usize) -> String {
    if !channel.tvg_id.is_empty() {
        channel.tvg_id.clone()
    } else if !channel.tvg_name.is_empty() {
        channel.tvg_name.clone()
    } else {
        format!("{}#{}", batch, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(tvg_id: &str, tvg_name: &str, url: &str) -> ChannelEntry {
        ChannelEntry {
            xui_id: 0,
            tvg_id: tvg_id.to_string(),
            tvg_name: tvg_name.to_string(),
            tvg_logo: String::new(),
            group_title: String::new(),
            url: url.to_string(),
            country: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_matching_record_gets_url_and_keeps_guide_fields() {
        let mut guide = channel("abc", "ABC", "");
        guide.tvg_logo = "http://logo.example/abc.png".to_string();
        guide.group_title = "News".to_string();

        let playlist = channel("abc", "ABC HD", "http://x/stream");

        let merged = reconcile(vec![guide], vec![playlist]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].url, "http://x/stream");
        assert_eq!(merged[0].tvg_logo, "http://logo.example/abc.png");
        // Empty playlist group must not clobber the guide value.
        assert_eq!(merged[0].group_title, "News");
    }

    #[test]
    fn test_non_empty_playlist_fields_win() {
        let mut guide = channel("abc", "ABC", "");
        guide.group_title = "News".to_string();
        guide.country = "UK".to_string();

        let mut playlist = channel("abc", "ABC", "http://x/stream");
        playlist.group_title = "World News".to_string();

        let merged = reconcile(vec![guide], vec![playlist]);
        assert_eq!(merged[0].group_title, "World News");
        assert_eq!(merged[0].country, "UK");
    }

    #[test]
    fn test_unmatched_playlist_channel_grows_the_set() {
        let guide = channel("abc", "ABC", "");
        let playlist = channel("xyz", "XYZ", "http://x/xyz");

        let merged = reconcile(vec![guide], vec![playlist]);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|c| c.tvg_id == "xyz"));
    }

    #[test]
    fn test_existing_channels_unreferenced_by_playlist_are_retained() {
        let guide_only = channel("old", "Old Channel", "http://x/old");
        let merged = reconcile(vec![guide_only], vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].tvg_id, "old");
    }

    #[test]
    fn test_channels_without_ids_fall_back_to_name_then_ordinal() {
        let unnamed_a = channel("", "", "http://x/a");
        let unnamed_b = channel("", "", "http://x/b");
        let named = channel("", "Named", "http://x/named");

        let merged = reconcile(vec![], vec![unnamed_a, unnamed_b, named]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_guide_merge_updates_metadata_and_keeps_learned_urls() {
        let mut stored = channel("abc", "ABC", "http://x/stream");
        stored.group_title = "News".to_string();

        let mut fresh = channel("abc", "ABC HD", "");
        fresh.xui_id = 101;
        fresh.tvg_logo = "http://logo.example/abc.png".to_string();

        let merged = merge_guide_channels(vec![stored], vec![fresh]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].tvg_name, "ABC HD");
        assert_eq!(merged[0].xui_id, 101);
        assert_eq!(merged[0].tvg_logo, "http://logo.example/abc.png");
        // The playlist-learned URL survives a guide entry without one.
        assert_eq!(merged[0].url, "http://x/stream");
        assert_eq!(merged[0].group_title, "News");
    }

    #[test]
    fn test_guide_merge_retains_unmentioned_channels_and_adds_new() {
        let stored = channel("gone", "No Longer Listed", "http://x/gone");
        let fresh = channel("new", "Brand New", "");

        let merged = merge_guide_channels(vec![stored], vec![fresh]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_playlist_channel_without_id_does_not_overwrite_existing() {
        // An id-less playlist entry that happens to share a name with an
        // existing record is inserted under its name key only if no such
        // key exists; the existing record is keyed by id first.
        let guide = channel("abc", "ABC", "");
        let playlist = channel("", "ABC", "http://x/abc");

        let merged = reconcile(vec![guide], vec![playlist]);
        assert_eq!(merged.len(), 2);
    }
}
