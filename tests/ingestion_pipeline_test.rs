//! End-to-end ingestion pipeline tests against an in-memory store:
//! guide parse -> channel/programme store write -> playlist parse ->
//! reconcile -> store rewrite.

use std::io::Write;

use epg_sync::config::DatabaseConfig;
use epg_sync::database::Database;
use epg_sync::ingestor::{merge_guide_channels, reconcile, PlaylistIngestor, XmltvIngestor};

const GUIDE_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="news.example">
    <display-name>Example News</display-name>
    <display-name>101</display-name>
    <icon src="http://logo.example/news.png"/>
  </channel>
  <channel id="sports.example">
    <display-name>Example Sports</display-name>
  </channel>
  <programme start="20400301100000 +0000" stop="20400301110000 +0000" channel="news.example">
    <title>Morning Briefing</title>
    <episode-num system="onscreen">S2E27</episode-num>
  </programme>
  <programme start="20400301110000 +0000" stop="20400301120000 +0000" channel="sports.example">
    <title>Matchday</title>
  </programme>
</tv>
"#;

const PLAYLIST_FIXTURE: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="news.example" group-title="News",Example News HD
http://stream.example/news/index.m3u8
#EXTINF:-1 tvg-id="radio.example" tvg-name="Example Radio",Example Radio
http://stream.example/radio/index.m3u8
"#;

async fn memory_database() -> Database {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(1),
    };
    let database = Database::new(&config).await.unwrap();
    database.migrate().await.unwrap();
    database
}

fn guide_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(GUIDE_FIXTURE.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_guide_then_playlist_fill_produces_merged_channel_set() {
    let database = memory_database().await;
    let xmltv = XmltvIngestor::new("UTC", None);

    // Guide fill: channels and programmes land in the store.
    let file = guide_file();
    let doc = xmltv.parse_xmltv_full(file.path()).unwrap();
    let existing = database.get_channel_entries().await.unwrap();
    let merged = merge_guide_channels(existing, doc.channels);
    database.replace_channels(&merged).await.unwrap();
    database.replace_programmes(&doc.programmes).await.unwrap();

    // Playlist fill: stream URLs are reconciled in.
    let playlist_channels = PlaylistIngestor::new().parse(PLAYLIST_FIXTURE);
    let existing = database.get_channel_entries().await.unwrap();
    let merged = reconcile(existing, playlist_channels);
    database.replace_channels(&merged).await.unwrap();

    let stored = database.get_channel_entries().await.unwrap();
    assert_eq!(stored.len(), 3);

    let news = stored.iter().find(|c| c.tvg_id == "news.example").unwrap();
    assert_eq!(news.url, "http://stream.example/news/index.m3u8");
    assert_eq!(news.group_title, "News");
    // Guide-sourced fields survive the playlist merge.
    assert_eq!(news.tvg_name, "Example News");
    assert_eq!(news.tvg_logo, "http://logo.example/news.png");
    assert_eq!(news.xui_id, 101);

    let sports = stored.iter().find(|c| c.tvg_id == "sports.example").unwrap();
    assert_eq!(sports.url, "");

    // The playlist-only channel was inserted as a new entry.
    let radio = stored.iter().find(|c| c.tvg_id == "radio.example").unwrap();
    assert_eq!(radio.url, "http://stream.example/radio/index.m3u8");
}

#[tokio::test]
async fn test_programme_store_replace_and_staleness_probe() {
    let database = memory_database().await;
    let xmltv = XmltvIngestor::new("UTC", None);

    assert_eq!(database.max_programme_stop().await.unwrap(), None);

    let file = guide_file();
    let programmes = xmltv.parse_xmltv(file.path()).unwrap();
    assert_eq!(programmes.len(), 2);
    database.replace_programmes(&programmes).await.unwrap();

    let stored = database.get_programme_entries().await.unwrap();
    assert_eq!(stored.len(), 2);
    let briefing = stored.iter().find(|p| p.title == "Morning Briefing").unwrap();
    assert_eq!(briefing.channel, "news.example");
    assert_eq!(briefing.episode_num, "S2E27");
    assert_eq!(briefing.season, Some(2));
    assert_eq!(briefing.episode, Some(27));

    let max_stop = database.max_programme_stop().await.unwrap().unwrap();
    let expected = stored.iter().map(|p| p.stop_ts).max().unwrap();
    assert_eq!(max_stop, expected);

    // A second replace fully supersedes the first write.
    database.replace_programmes(&programmes[..1]).await.unwrap();
    assert_eq!(database.get_programme_entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_channel_store_contract_roundtrip() {
    let database = memory_database().await;
    let playlist_channels = PlaylistIngestor::new().parse(PLAYLIST_FIXTURE);

    database.add_channels(&playlist_channels).await.unwrap();
    let stored = database.get_channel_entries().await.unwrap();
    assert_eq!(stored.len(), 2);
    let radio = stored.iter().find(|c| c.tvg_id == "radio.example").unwrap();
    assert_eq!(radio.tvg_name, "Example Radio");

    database.clear_channels().await.unwrap();
    assert!(database.get_channel_entries().await.unwrap().is_empty());
}
