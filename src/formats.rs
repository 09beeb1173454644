//! Format classification and ranking.
//!
//! Raw extractor formats are reduced to a handful of entries a client can
//! offer directly: audio-only streams and progressive (audio+video) streams,
//! one per quality bucket, best first.

use std::{cmp::Reverse, collections::HashMap, hash::Hash};

use serde::Serialize;
use serde_json::Value;

const GENERAL_AUDIO_LIMIT: usize = 2;
const GENERAL_VIDEO_LIMIT: usize = 5;
const ALTERNATE_AUDIO_LIMIT: usize = 3;

const RESOLUTION_ORDER: [&str; 8] = [
    "2160p", "1440p", "1080p", "720p", "480p", "360p", "240p", "144p",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatEntry {
    pub url: String,
    pub ext: String,
    #[serde(rename = "type")]
    pub kind: FormatKind,
    pub resolution: Option<String>,
    pub bitrate: Option<u32>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedFormatSet {
    pub audio: Vec<FormatEntry>,
    pub video: Vec<FormatEntry>,
}

impl RankedFormatSet {
    /// Audio entries first, then video, each already in rank order.
    pub fn into_formats(self) -> Vec<FormatEntry> {
        let mut formats = self.audio;
        formats.extend(self.video);
        formats
    }
}

/// Field view over one raw yt-dlp format object. Numbers are read leniently
/// since the extractor mixes integers and floats for the same keys.
struct RawFormat<'a> {
    url: Option<&'a str>,
    ext: Option<&'a str>,
    vcodec: Option<&'a str>,
    acodec: Option<&'a str>,
    height: Option<u64>,
    abr: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl<'a> RawFormat<'a> {
    fn read(value: &'a Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str);
        let number = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_f64)
                .filter(|number| number.is_finite() && *number > 0.0)
        };

        Self {
            url: text("url").filter(|url| !url.trim().is_empty()),
            ext: text("ext"),
            vcodec: text("vcodec"),
            acodec: text("acodec"),
            height: number("height").map(|height| height as u64),
            abr: number("abr"),
            filesize: number("filesize"),
            filesize_approx: number("filesize_approx"),
        }
    }

    fn has_video(&self) -> bool {
        matches!(self.vcodec, Some(value) if value != "none")
    }

    fn has_audio(&self) -> bool {
        matches!(self.acodec, Some(value) if value != "none")
    }
}

/// Turns one raw format into an entry, or drops it: no URL, video-only
/// streams, and (for the music source) anything that is not audio-only.
fn classify(value: &Value, is_alternate_source: bool) -> Option<FormatEntry> {
    let raw = RawFormat::read(value);
    let url = raw.url?;

    let kind = match (raw.has_video(), raw.has_audio()) {
        (false, true) => FormatKind::Audio,
        (true, true) if !is_alternate_source => FormatKind::Video,
        _ => return None,
    };

    let ext_raw = raw.ext.unwrap_or_default().to_ascii_lowercase();
    let ext = match kind {
        FormatKind::Audio if is_alternate_source => "m4a".to_string(),
        FormatKind::Audio if matches!(ext_raw.as_str(), "mp4" | "m4a") => "m4a".to_string(),
        FormatKind::Video if ext_raw.contains("mp4") => "mp4".to_string(),
        _ => ext_raw,
    };

    Some(FormatEntry {
        url: url.to_string(),
        ext,
        kind,
        resolution: raw.height.map(|height| format!("{height}p")),
        bitrate: raw.abr.map(|abr| abr as u32).filter(|abr| *abr > 0),
        size: raw.filesize.or(raw.filesize_approx).map(|size| size as u64),
    })
}

/// Keeps one entry per key, preferring the larger declared size. The
/// surviving entry takes the slot of the first entry seen with that key.
fn dedupe_by<K, F>(entries: Vec<FormatEntry>, key: F) -> Vec<FormatEntry>
where
    K: Eq + Hash,
    F: Fn(&FormatEntry) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut kept: Vec<FormatEntry> = Vec::new();

    for entry in entries {
        match slots.get(&key(&entry)) {
            Some(&index) => {
                if entry.size.unwrap_or(0) > kept[index].size.unwrap_or(0) {
                    kept[index] = entry;
                }
            }
            None => {
                slots.insert(key(&entry), kept.len());
                kept.push(entry);
            }
        }
    }

    kept
}

fn resolution_rank(resolution: Option<&str>) -> usize {
    resolution
        .and_then(|label| RESOLUTION_ORDER.iter().position(|tier| *tier == label))
        .unwrap_or(RESOLUTION_ORDER.len())
}

pub fn rank_formats(raw_formats: &[Value], is_alternate_source: bool) -> RankedFormatSet {
    let (audio, video): (Vec<_>, Vec<_>) = raw_formats
        .iter()
        .filter_map(|value| classify(value, is_alternate_source))
        .partition(|entry| entry.kind == FormatKind::Audio);

    let mut audio = dedupe_by(audio, |entry| entry.bitrate.unwrap_or(0));
    audio.sort_by_key(|entry| Reverse(entry.bitrate.unwrap_or(0)));

    let mut video = dedupe_by(video, |entry| entry.resolution.clone());
    video.sort_by_key(|entry| resolution_rank(entry.resolution.as_deref()));

    audio.truncate(if is_alternate_source {
        ALTERNATE_AUDIO_LIMIT
    } else {
        GENERAL_AUDIO_LIMIT
    });
    video.truncate(GENERAL_VIDEO_LIMIT);

    RankedFormatSet { audio, video }
}
