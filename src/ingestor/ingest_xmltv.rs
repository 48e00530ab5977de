//! Streaming XMLTV parser.
//!
//! Decodes `<channel>` and `<programme>` elements from a cached guide
//! file into channel and programme records. The parse is per-element
//! fault isolated: one malformed channel or programme is logged and
//! skipped, everything else is kept.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{AppResult, SourceError};
use crate::models::{ChannelEntry, ProgrammeEntry, XmltvDocument};
use crate::utils::time::{parse_timezone_or_utc, parse_xmltv_datetime};

pub struct XmltvIngestor {
    fallback_tz: Tz,
    stream_url_template: Option<String>,
}

impl XmltvIngestor {
    pub fn new(timezone: &str, stream_url_template: Option<String>) -> Self {
        Self {
            fallback_tz: parse_timezone_or_utc(timezone),
            stream_url_template,
        }
    }

    /// Parse channels and programmes from a cached XMLTV file.
    pub fn parse_xmltv_full(&self, path: &Path) -> AppResult<XmltvDocument> {
        self.parse(path, true)
    }

    /// Programmes-only parse for refresh cycles that skip channel
    /// re-derivation.
    pub fn parse_xmltv(&self, path: &Path) -> AppResult<Vec<ProgrammeEntry>> {
        Ok(self.parse(path, false)?.programmes)
    }

    fn parse(&self, path: &Path, collect_channels: bool) -> AppResult<XmltvDocument> {
        let mut reader = Reader::from_file(path)
            .map_err(|e| SourceError::parse_error("xmltv", format!("cannot open guide: {e}")))?;
        reader.config_mut().trim_text(true);

        let mut doc = XmltvDocument::default();
        let mut channel_map: HashMap<String, ChannelEntry> = HashMap::new();

        let mut current_channel: Option<ChannelBuilder> = None;
        let mut current_programme: Option<ProgrammeBuilder> = None;
        let mut episode_system = String::new();
        let mut current_text = String::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = element_name(e.name())?;
                    match name.as_str() {
                        "channel" if collect_channels => {
                            let attrs = parse_attributes(e);
                            current_channel = Some(ChannelBuilder {
                                id: attrs.get("id").cloned().unwrap_or_default(),
                                ..Default::default()
                            });
                        }
                        "programme" => {
                            let attrs = parse_attributes(e);
                            current_programme = Some(ProgrammeBuilder {
                                start: attrs.get("start").cloned().unwrap_or_default(),
                                stop: attrs.get("stop").cloned().unwrap_or_default(),
                                channel: attrs.get("channel").cloned().unwrap_or_default(),
                                ..Default::default()
                            });
                        }
                        "episode-num" => {
                            let attrs = parse_attributes(e);
                            episode_system = attrs.get("system").cloned().unwrap_or_default();
                        }
                        "icon" => {
                            // Non-self-closed icon carries its URL in the
                            // src attribute just like the empty form.
                            let attrs = parse_attributes(e);
                            if let Some(src) = attrs.get("src") {
                                assign_icon(&mut current_channel, &mut current_programme, src);
                            }
                        }
                        "previously-shown" => {
                            if let Some(ref mut programme) = current_programme {
                                programme.previously_shown = true;
                            }
                        }
                        _ => {}
                    }
                    current_text.clear();
                }

                Ok(Event::End(ref e)) => {
                    let name = element_name(e.name())?;
                    match name.as_str() {
                        "channel" => {
                            if let Some(builder) = current_channel.take() {
                                self.finish_channel(builder, &mut channel_map, &mut doc.channels);
                            }
                        }
                        "programme" => {
                            if let Some(builder) = current_programme.take() {
                                if let Some(programme) = self.finish_programme(builder) {
                                    doc.programmes.push(programme);
                                }
                            }
                        }
                        "display-name" => {
                            if let Some(ref mut channel) = current_channel {
                                channel.display_names.push(current_text.trim().to_string());
                            }
                        }
                        _ => {
                            if let Some(ref mut programme) = current_programme {
                                let text = current_text.trim();
                                match name.as_str() {
                                    "title" => programme.title = text.to_string(),
                                    "desc" => programme.description = text.to_string(),
                                    "sub-title" => programme.subtitle = text.to_string(),
                                    "category" => programme.category = text.to_string(),
                                    "date" => programme.date = text.to_string(),
                                    "image" => programme.image = text.to_string(),
                                    "episode-num" => match episode_system.as_str() {
                                        "onscreen" => {
                                            programme.episode_onscreen = Some(text.to_string())
                                        }
                                        "xmltv_ns" => programme.episode_ns = Some(text.to_string()),
                                        _ => {}
                                    },
                                    _ => {}
                                }
                            }
                        }
                    }
                    current_text.clear();
                }

                Ok(Event::Empty(ref e)) => {
                    let name = element_name(e.name())?;
                    match name.as_str() {
                        "icon" => {
                            let attrs = parse_attributes(e);
                            if let Some(src) = attrs.get("src") {
                                assign_icon(&mut current_channel, &mut current_programme, src);
                            }
                        }
                        "previously-shown" => {
                            if let Some(ref mut programme) = current_programme {
                                programme.previously_shown = true;
                            }
                        }
                        _ => {}
                    }
                }

                Ok(Event::Text(e)) => {
                    let text = std::str::from_utf8(&e).map_err(|e| {
                        SourceError::parse_error("xmltv", format!("invalid UTF-8 in text: {e}"))
                    })?;
                    current_text.push_str(text);
                }

                Ok(Event::CData(e)) => {
                    let text = std::str::from_utf8(&e).map_err(|e| {
                        SourceError::parse_error("xmltv", format!("invalid UTF-8 in CDATA: {e}"))
                    })?;
                    current_text.push_str(text);
                }

                Ok(Event::Eof) => break,

                Err(e) => {
                    return Err(
                        SourceError::parse_error("xmltv", format!("XML parsing error: {e}")).into(),
                    );
                }

                _ => {}
            }
            buf.clear();
        }

        log_summary(&doc);
        Ok(doc)
    }

    fn finish_channel(
        &self,
        builder: ChannelBuilder,
        channel_map: &mut HashMap<String, ChannelEntry>,
        channels: &mut Vec<ChannelEntry>,
    ) {
        if builder.id.is_empty() && builder.display_names.is_empty() {
            warn!("Skipping channel element with neither id nor display-name");
            return;
        }

        let tvg_name = builder
            .display_names
            .first()
            .cloned()
            .unwrap_or_else(|| builder.id.clone());

        // The first purely-numeric display-name is the channel number.
        let xui_id = builder
            .display_names
            .iter()
            .map(|n| n.trim())
            .find(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or(0);

        let url = match (&self.stream_url_template, xui_id) {
            (Some(template), n) if n > 0 => template.replace("{channel}", &n.to_string()),
            _ => String::new(),
        };

        let channel = ChannelEntry {
            xui_id,
            tvg_id: builder.id,
            tvg_name,
            tvg_logo: builder.icon,
            group_title: String::new(),
            url,
            country: String::new(),
            created_at: Utc::now(),
        };

        // Duplicate ids: identical repeats are skipped silently,
        // conflicting repeats keep the first occurrence.
        if !channel.tvg_id.is_empty() {
            if let Some(existing) = channel_map.get(&channel.tvg_id) {
                if existing.tvg_name == channel.tvg_name && existing.tvg_logo == channel.tvg_logo {
                    debug!("Duplicate identical channel: {}", channel.tvg_id);
                } else {
                    warn!(
                        "Duplicate conflicting channel '{}' ('{}' vs '{}'), keeping first",
                        channel.tvg_id, existing.tvg_name, channel.tvg_name
                    );
                }
                return;
            }
            channel_map.insert(channel.tvg_id.clone(), channel.clone());
        }

        channels.push(channel);
    }

    fn finish_programme(&self, builder: ProgrammeBuilder) -> Option<ProgrammeEntry> {
        let identity = if builder.title.is_empty() {
            builder.channel.clone()
        } else {
            builder.title.clone()
        };

        if builder.start.is_empty() || builder.stop.is_empty() {
            warn!(
                "Skipping programme '{}': missing mandatory start/stop attribute",
                identity
            );
            return None;
        }

        let start = match parse_xmltv_datetime(&builder.start, &self.fallback_tz) {
            Some(dt) => dt,
            None => {
                warn!(
                    "Skipping programme '{}': unparseable start '{}'",
                    identity, builder.start
                );
                return None;
            }
        };
        let stop = match parse_xmltv_datetime(&builder.stop, &self.fallback_tz) {
            Some(dt) => dt,
            None => {
                warn!(
                    "Skipping programme '{}': unparseable stop '{}'",
                    identity, builder.stop
                );
                return None;
            }
        };

        if start >= stop {
            warn!(
                "Programme '{}' has start {} >= stop {}; keeping it anyway",
                identity, builder.start, builder.stop
            );
        }

        let (episode_num, season, episode) =
            resolve_episode(&builder.episode_onscreen, &builder.episode_ns);

        Some(ProgrammeEntry {
            start: start.to_rfc3339(),
            start_ts: start.timestamp(),
            stop: stop.to_rfc3339(),
            stop_ts: stop.timestamp(),
            channel: builder.channel,
            title: builder.title,
            description: builder.description,
            category: builder.category,
            subtitle: builder.subtitle,
            episode_num,
            season,
            episode,
            icon: builder.icon,
            image: builder.image,
            date: builder.date,
            previously_shown: builder.previously_shown,
            created_at: Utc::now(),
        })
    }
}

#[derive(Default)]
struct ChannelBuilder {
    id: String,
    display_names: Vec<String>,
    icon: String,
}

#[derive(Default)]
struct ProgrammeBuilder {
    start: String,
    stop: String,
    channel: String,
    title: String,
    description: String,
    subtitle: String,
    category: String,
    date: String,
    icon: String,
    image: String,
    episode_onscreen: Option<String>,
    episode_ns: Option<String>,
    previously_shown: bool,
}

/// Resolve the two episode-number encodings. An `onscreen` value is
/// retained verbatim and takes precedence; `xmltv_ns` only applies when
/// onscreen yielded no season.
fn resolve_episode(
    onscreen: &Option<String>,
    xmltv_ns: &Option<String>,
) -> (String, Option<i64>, Option<i64>) {
    let mut episode_num = String::new();
    let mut season = None;
    let mut episode = None;

    if let Some(raw) = onscreen {
        episode_num = raw.clone();
        if let Some((s, e)) = parse_onscreen(raw) {
            season = Some(s);
            episode = Some(e);
        }
    }

    if season.is_none() {
        if let Some(raw) = xmltv_ns {
            let (s, e) = parse_xmltv_ns(raw);
            season = s;
            episode = episode.or(e);
        }
    }

    (episode_num, season, episode)
}

/// Parse the `onscreen` encoding, e.g. "S2E27" (case-insensitive).
fn parse_onscreen(raw: &str) -> Option<(i64, i64)> {
    let re = Regex::new(r"(?i)S(\d+)E(\d+)").ok()?;
    let caps = re.captures(raw)?;
    let season = caps.get(1)?.as_str().parse::<i64>().ok()?;
    let episode = caps.get(2)?.as_str().parse::<i64>().ok()?;
    Some((season, episode))
}

/// Parse the `xmltv_ns` encoding: dot-separated 0-indexed
/// `season.episode.part`, each part possibly of the form `n/total`.
/// Non-numeric parts stay unset.
fn parse_xmltv_ns(raw: &str) -> (Option<i64>, Option<i64>) {
    let mut parts = raw.split('.');
    let season = parts.next().and_then(parse_ns_part).map(|n| n + 1);
    let episode = parts.next().and_then(parse_ns_part).map(|n| n + 1);
    (season, episode)
}

fn parse_ns_part(part: &str) -> Option<i64> {
    let head = part.split('/').next().unwrap_or(part);
    head.trim().parse::<i64>().ok()
}

fn element_name(name: quick_xml::name::QName) -> AppResult<String> {
    Ok(std::str::from_utf8(name.as_ref())
        .map_err(|e| SourceError::parse_error("xmltv", format!("invalid UTF-8 in element: {e}")))?
        .to_string())
}

/// Parse XML attributes into a map.
fn parse_attributes(element: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for attr in element.attributes().flatten() {
        if let (Ok(key), Ok(value)) = (
            std::str::from_utf8(attr.key.as_ref()),
            std::str::from_utf8(&attr.value),
        ) {
            attrs.insert(key.to_string(), value.to_string());
        }
    }
    attrs
}

fn assign_icon(
    current_channel: &mut Option<ChannelBuilder>,
    current_programme: &mut Option<ProgrammeBuilder>,
    src: &str,
) {
    if let Some(programme) = current_programme {
        programme.icon = src.to_string();
    } else if let Some(channel) = current_channel {
        channel.icon = src.to_string();
    }
}

/// Log-only summary statistics, an observability aid rather than a
/// correctness gate.
fn log_summary(doc: &XmltvDocument) {
    let referenced: HashSet<&str> = doc.programmes.iter().map(|p| p.channel.as_str()).collect();
    let min_start = doc.programmes.iter().map(|p| p.start_ts).min();
    let max_start = doc.programmes.iter().map(|p| p.start_ts).max();

    info!(
        "Parsed {} channels, {} programmes across {} referenced channels",
        doc.channels.len(),
        doc.programmes.len(),
        referenced.len()
    );
    if let (Some(min), Some(max)) = (min_start, max_start) {
        info!(
            "Programme coverage: first start {}, last start {}",
            format_ts(min),
            format_ts(max)
        );
    }
}

fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
