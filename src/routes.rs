use std::path::{Path, PathBuf};

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    AppState,
    archive::write_zip,
    auth::AuthenticatedUser,
    error::{ApiError, FetchError},
    extractor::ExtractionConfig,
    media::{ExtractionResult, MediaItem, Playlist},
    response::{attachment, expected_audio_filename, playlist_payload, single_item_payload},
    source::normalize_source_url,
    workspace::ScratchWorkspace,
};

const ARCHIVE_NAME: &str = "playlist.zip";
const AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: Option<String>,
    #[serde(default)]
    pub convert_mp3: bool,
}

pub async fn root_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "message": "FetchMate backend running!"}))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn fetch_link(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let user_id = user.user_id.unwrap_or_else(|| "-".to_string());
    let span = info_span!("fetch_link", request_id = %Uuid::new_v4(), user_id = %user_id);

    resolve_link(&state, payload)
        .instrument(span.clone())
        .await
        .map_err(|failure| {
            span.in_scope(|| log_failure(&failure));
            ApiError::from(failure)
        })
}

fn log_failure(failure: &FetchError) {
    match failure {
        FetchError::MissingUrl => debug!("Rejected request without URL"),
        FetchError::AccessDenied { detail, .. } => warn!("Content requires sign-in: {detail}"),
        FetchError::Extraction { detail } => warn!("Extraction failed: {detail}"),
        FetchError::ConversionFailed { detail } => error!("Conversion failed: {detail}"),
        FetchError::Unexpected { detail } => error!("Unexpected failure: {detail}"),
    }
}

/// Runs one resolution request end to end. The scratch workspace created
/// here is dropped on every return path, or handed to the response body
/// when a file is streamed back.
pub async fn resolve_link(state: &AppState, request: FetchRequest) -> Result<Response, FetchError> {
    let raw_url = request
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(FetchError::MissingUrl)?;

    let source = normalize_source_url(raw_url);
    let workspace = ScratchWorkspace::create_in(&state.config.scratch_root).await?;
    let cookies_file = available_cookies(&state.config.cookies_file).await;

    info!(
        url = %source.url,
        alternate_source = source.is_alternate_source,
        convert_mp3 = request.convert_mp3,
        cookies = cookies_file.is_some(),
        "Resolving link"
    );

    let config = ExtractionConfig::new(
        &source.url,
        request.convert_mp3,
        workspace.path(),
        cookies_file,
    );
    let result = state.extractor.extract(&config).await?;

    match (result, request.convert_mp3) {
        (ExtractionResult::Single(item), true) => single_audio(workspace, &item).await,
        (ExtractionResult::Single(item), false) => {
            Ok(Json(single_item_payload(item, source.is_alternate_source)).into_response())
        }
        (ExtractionResult::Playlist(playlist), true) => playlist_archive(workspace, &playlist).await,
        (ExtractionResult::Playlist(playlist), false) => Ok(Json(playlist_payload(
            playlist,
            state.config.playlist_formats,
            source.is_alternate_source,
        ))
        .into_response()),
    }
}

/// Cookie jar path if the file exists right now.
async fn available_cookies(path: &Path) -> Option<PathBuf> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Some(path.to_path_buf()),
        Ok(false) => {
            debug!("No cookie file at {:?}", path);
            None
        }
        Err(error) => {
            warn!("Could not check cookie file {:?}: {error}", path);
            None
        }
    }
}

/// The produced mp3 for a single item: the expected name, or the only mp3
/// in the workspace when yt-dlp named it differently.
async fn locate_single_output(workspace: &ScratchWorkspace, filename: &str) -> Option<PathBuf> {
    let expected = workspace.file(filename);
    if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
        return Some(expected);
    }

    let mut produced = workspace.files_with_extension(AUDIO_EXTENSION).await;
    if produced.len() == 1 {
        debug!("Using {:?} in place of {filename:?}", produced[0]);
        return produced.pop();
    }
    None
}

async fn single_audio(workspace: ScratchWorkspace, item: &MediaItem) -> Result<Response, FetchError> {
    let filename = expected_audio_filename(item.title.as_deref());
    let Some(path) = locate_single_output(&workspace, &filename).await else {
        return Err(FetchError::ConversionFailed {
            detail: format!("expected {:?} in scratch workspace", filename),
        });
    };

    let (stream, length) = workspace.into_file_stream(&path).await?;
    info!(bytes = length, "Streaming converted audio {filename:?}");
    attachment(stream, length, &filename, "audio/mpeg")
}

async fn playlist_archive(
    workspace: ScratchWorkspace,
    playlist: &Playlist,
) -> Result<Response, FetchError> {
    let mut members: Vec<PathBuf> = playlist
        .items
        .iter()
        .map(|item| workspace.file(&expected_audio_filename(item.title.as_deref())))
        .collect();
    // mp3s whose names differ from the expected ones still belong to this request
    for produced in workspace.files_with_extension(AUDIO_EXTENSION).await {
        if !members.contains(&produced) {
            members.push(produced);
        }
    }
    let archive_path = workspace.file(ARCHIVE_NAME);

    let stored = {
        let archive_path = archive_path.clone();
        tokio::task::spawn_blocking(move || write_zip(&archive_path, &members))
            .await
            .map_err(|error| FetchError::unexpected(format!("archive task failed: {error}")))?
            .map_err(|error| FetchError::unexpected(format!("could not write archive: {error}")))?
    };

    if stored == 0 {
        return Err(FetchError::ConversionFailed {
            detail: format!(
                "none of the {} playlist items produced a file",
                playlist.items.len()
            ),
        });
    }
    if stored < playlist.items.len() {
        warn!(
            "Archived {stored} of {} playlist items, the rest produced no file",
            playlist.items.len()
        );
    }

    let (stream, length) = workspace.into_file_stream(&archive_path).await?;
    info!(bytes = length, files = stored, "Streaming playlist archive");
    attachment(stream, length, ARCHIVE_NAME, "application/zip")
}
