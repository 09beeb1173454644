//! Client-facing response shapes.

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    config::PlaylistFormats,
    error::FetchError,
    formats::{FormatEntry, rank_formats},
    media::{MediaItem, Playlist},
    workspace::WorkspaceStream,
};

/// Label the client shows for music-source results.
const AUTO_FORMAT_LABEL: &str = "AUTO";
/// yt-dlp's placeholder for a missing template field.
const MISSING_TITLE: &str = "NA";

#[derive(Debug, Serialize)]
pub struct SingleItemPayload {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_label: Option<&'static str>,
    pub formats: Vec<FormatEntry>,
}

#[derive(Debug, Serialize)]
pub struct PlaylistPayload {
    pub playlist_title: Option<String>,
    pub uploader: Option<String>,
    pub tracks: Vec<TrackPayload>,
}

#[derive(Debug, Serialize)]
pub struct TrackPayload {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    pub formats: TrackFormats,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TrackFormats {
    Raw(Vec<Value>),
    Ranked(Vec<FormatEntry>),
}

pub fn single_item_payload(item: MediaItem, is_alternate_source: bool) -> SingleItemPayload {
    let formats = rank_formats(&item.formats, is_alternate_source).into_formats();

    SingleItemPayload {
        title: item.title,
        thumbnail: item.thumbnail,
        uploader: item.uploader,
        format_label: is_alternate_source.then_some(AUTO_FORMAT_LABEL),
        formats,
    }
}

pub fn playlist_payload(
    playlist: Playlist,
    mode: PlaylistFormats,
    is_alternate_source: bool,
) -> PlaylistPayload {
    let tracks = playlist
        .items
        .into_iter()
        .map(|item| {
            let formats = match mode {
                PlaylistFormats::Raw => TrackFormats::Raw(item.formats),
                PlaylistFormats::Ranked => TrackFormats::Ranked(
                    rank_formats(&item.formats, is_alternate_source).into_formats(),
                ),
            };
            TrackPayload {
                title: item.title,
                uploader: item.uploader,
                thumbnail: item.thumbnail,
                formats,
            }
        })
        .collect();

    PlaylistPayload {
        playlist_title: playlist.title,
        uploader: playlist.uploader,
        tracks,
    }
}

/// Strips characters that are unsafe in file names on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|character| !matches!(character, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect()
}

/// File name the transcoder is expected to have produced for `title`.
pub fn expected_audio_filename(title: Option<&str>) -> String {
    sanitize_filename(&format!("{}.mp3", title.unwrap_or(MISSING_TITLE)))
}

fn is_plain_header_text(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|character| matches!(character, ' '..='~') && character != '\\' && character != '"')
}

fn ascii_fallback(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|character| {
            if matches!(character, ' '..='~') && character != '\\' && character != '"' {
                character
            } else {
                '_'
            }
        })
        .collect();

    let compact = replaced.trim();
    if compact.is_empty() {
        "download".to_string()
    } else {
        compact.to_string()
    }
}

pub fn content_disposition(filename: &str) -> String {
    if is_plain_header_text(filename) {
        format!("attachment; filename=\"{filename}\"")
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii_fallback(filename),
            urlencoding::encode(filename)
        )
    }
}

/// Streams a workspace file back as a download. The workspace goes away
/// once the body has been sent or dropped.
pub fn attachment(
    stream: WorkspaceStream,
    length: u64,
    filename: &str,
    content_type: &'static str,
) -> Result<Response, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(filename)).map_err(|error| {
            FetchError::unexpected(format!("invalid content disposition for {filename:?}: {error}"))
        })?,
    );

    Ok((headers, Body::from_stream(stream)).into_response())
}
