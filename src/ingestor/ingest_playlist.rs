//! M3U playlist parser.
//!
//! An M3U entry is two physical lines: an `#EXTINF:` attribute line
//! followed by the entry's stream URL on the next non-comment line.
//! Attribute extraction is best-effort: malformed attribute text
//! degrades to empty fields, never to a failed line.

use chrono::Utc;
use tracing::{debug, warn};

use crate::models::ChannelEntry;

pub struct PlaylistIngestor;

impl PlaylistIngestor {
    pub fn new() -> Self {
        Self
    }

    /// Parse a playlist into partial channel records with stream URLs.
    ///
    /// An `#EXTINF:` line opens a pending record; the next non-comment,
    /// non-blank line closes it as the record's URL. A pending record
    /// displaced by another `#EXTINF:` line, or left open at end of
    /// input, is dropped.
    pub fn parse(&self, content: &str) -> Vec<ChannelEntry> {
        let mut channels = Vec::new();
        let mut pending: Option<ChannelEntry> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("#EXTINF:") {
                if let Some(dropped) = pending.take() {
                    warn!(
                        "EXTINF entry '{}' has no stream URL line, dropping it",
                        entry_label(&dropped)
                    );
                }
                pending = Some(Self::from_playlist_line(rest));
            } else if line.starts_with('#') {
                // Other directives (#EXTM3U, #EXTVLCOPT, ...) never close
                // a pending entry.
                continue;
            } else if let Some(mut channel) = pending.take() {
                channel.url = line.to_string();
                channel.created_at = Utc::now();
                channels.push(channel);
            }
        }

        if let Some(dropped) = pending {
            warn!(
                "EXTINF entry '{}' at end of playlist has no stream URL line, dropping it",
                entry_label(&dropped)
            );
        }

        debug!("Parsed {} channels from playlist", channels.len());
        channels
    }

    /// Decode one `#EXTINF:` line (prefix already stripped) into a
    /// partial channel record with `url` unset.
    pub fn from_playlist_line(extinf_line: &str) -> ChannelEntry {
        // #EXTINF:-1 tvg-id="..." tvg-name="..." ...,Display Name
        let (attributes_part, display_name) = match extinf_line.rfind(',') {
            Some(comma_pos) => (
                &extinf_line[..comma_pos],
                extinf_line[comma_pos + 1..].trim(),
            ),
            None => (extinf_line, ""),
        };

        let mut channel = ChannelEntry::new(Utc::now());

        for (key, value) in parse_attributes(attributes_part) {
            match key.as_str() {
                "tvg-id" => channel.tvg_id = value,
                "tvg-name" => channel.tvg_name = value,
                "tvg-logo" => channel.tvg_logo = value,
                "group-title" => channel.group_title = value,
                "tvg-country" => channel.country = value,
                _ => {}
            }
        }

        if channel.tvg_name.is_empty() {
            channel.tvg_name = display_name.to_string();
        }

        channel
    }
}

impl Default for PlaylistIngestor {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_label(channel: &ChannelEntry) -> &str {
    if !channel.tvg_id.is_empty() {
        &channel.tvg_id
    } else {
        &channel.tvg_name
    }
}

/// Best-effort key=value extraction from an EXTINF attribute section.
fn parse_attributes(attributes: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_value = false;
    let mut escape_next = false;

    for ch in attributes.chars() {
        if escape_next {
            if in_value {
                current_value.push(ch);
            } else {
                current_key.push(ch);
            }
            escape_next = false;
            continue;
        }

        match ch {
            '\\' => escape_next = true,
            '"' => {
                if in_value {
                    in_quotes = !in_quotes;
                }
            }
            '=' if !in_quotes && !in_value => {
                in_value = true;
            }
            ' ' | '\t' if !in_quotes => {
                if in_value && !current_value.is_empty() {
                    attrs.push((
                        current_key.trim().to_string(),
                        current_value.trim_matches('"').to_string(),
                    ));
                    current_value.clear();
                }
                current_key.clear();
                in_value = false;
            }
            _ => {
                if in_value {
                    current_value.push(ch);
                } else {
                    current_key.push(ch);
                }
            }
        }
    }

    if in_value && !current_value.is_empty() {
        attrs.push((
            current_key.trim().to_string(),
            current_value.trim_matches('"').to_string(),
        ));
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="news.example" tvg-name="Example News" tvg-logo="http://logo.example/news.png" group-title="News" tvg-country="UK",Example News HD
http://stream.example/news/index.m3u8
#EXTINF:-1 tvg-id="sports.example",Example Sports
#EXTVLCOPT:network-caching=1000
http://stream.example/sports/index.m3u8
"#;

    #[test]
    fn test_parse_two_line_entries() {
        let channels = PlaylistIngestor::new().parse(SAMPLE_PLAYLIST);
        assert_eq!(channels.len(), 2);

        let news = &channels[0];
        assert_eq!(news.tvg_id, "news.example");
        assert_eq!(news.tvg_name, "Example News");
        assert_eq!(news.tvg_logo, "http://logo.example/news.png");
        assert_eq!(news.group_title, "News");
        assert_eq!(news.country, "UK");
        assert_eq!(news.url, "http://stream.example/news/index.m3u8");

        // The #EXTVLCOPT directive must not close the second entry.
        assert_eq!(channels[1].url, "http://stream.example/sports/index.m3u8");
    }

    #[test]
    fn test_extinf_followed_by_extinf_drops_the_first() {
        let playlist = r#"#EXTINF:-1 tvg-id="a",First
#EXTINF:-1 tvg-id="b",Second
http://stream.example/b
"#;
        let channels = PlaylistIngestor::new().parse(playlist);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].tvg_id, "b");
        assert_eq!(channels[0].url, "http://stream.example/b");
    }

    #[test]
    fn test_trailing_extinf_without_url_emits_nothing() {
        let playlist = "#EXTINF:-1 tvg-id=\"a\",Dangling\n";
        assert!(PlaylistIngestor::new().parse(playlist).is_empty());
    }

    #[test]
    fn test_absent_attributes_default_to_empty() {
        let channel = PlaylistIngestor::from_playlist_line("-1,Bare Channel");
        assert_eq!(channel.tvg_id, "");
        assert_eq!(channel.tvg_logo, "");
        assert_eq!(channel.group_title, "");
        assert_eq!(channel.country, "");
        assert_eq!(channel.url, "");
        // The trailing display name fills in for a missing tvg-name.
        assert_eq!(channel.tvg_name, "Bare Channel");
    }

    #[test]
    fn test_quoted_values_may_contain_spaces_and_commas_stay_out() {
        let channel = PlaylistIngestor::from_playlist_line(
            r#"-1 tvg-name="名前 with spaces" group-title="Movies & Series",Display"#,
        );
        assert_eq!(channel.tvg_name, "名前 with spaces");
        assert_eq!(channel.group_title, "Movies & Series");
    }

    #[test]
    fn test_garbled_attribute_text_degrades_to_defaults() {
        let channel = PlaylistIngestor::from_playlist_line("-1 tvg-id= ==== tvg-,Junk");
        assert_eq!(channel.tvg_id, "");
        assert_eq!(channel.tvg_name, "Junk");
    }
}
