//! Extractor output as the rest of the service sees it.
//!
//! yt-dlp's single-JSON dump is loosely structured: a playlist is an info
//! object with an `entries` array, a single video is one without. Format
//! objects are kept as raw JSON so playlist responses can hand them back
//! untouched; [`crate::formats`] reads the fields it needs from them.

use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    formats: Option<Vec<Value>>,
    entries: Option<Vec<Option<RawInfo>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    pub formats: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub items: Vec<MediaItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Single(MediaItem),
    Playlist(Playlist),
}

impl ExtractionResult {
    /// Parses the extractor's JSON dump. Dispatch is structural: anything
    /// carrying an `entries` collection is a playlist, whatever the URL
    /// looked like.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FetchError> {
        let raw: RawInfo = serde_json::from_slice(bytes).map_err(|error| {
            FetchError::unexpected(format!("could not parse extractor output: {error}"))
        })?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawInfo) -> Self {
        match raw.entries {
            Some(entries) => Self::Playlist(Playlist {
                title: raw.title,
                uploader: raw.uploader.or(raw.channel),
                items: entries
                    .into_iter()
                    .flatten()
                    .map(MediaItem::from_raw)
                    .collect(),
            }),
            None => Self::Single(MediaItem::from_raw(raw)),
        }
    }
}

impl MediaItem {
    fn from_raw(raw: RawInfo) -> Self {
        Self {
            title: raw.title,
            uploader: raw.uploader.or(raw.channel),
            thumbnail: raw.thumbnail,
            formats: raw.formats.unwrap_or_default(),
        }
    }
}
