//! Request-scoped scratch directories.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use axum::body::Bytes;
use futures::Stream;
use tempfile::TempDir;
use tokio::{fs::File, runtime::Handle, time::Duration};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::FetchError;

const WORKSPACE_PREFIX: &str = "fetch-";

/// Temporary directory owned by one request. Dropping it removes the
/// directory and everything in it; removal errors are ignored. Inside a
/// runtime the recursive delete runs on the blocking pool.
#[derive(Debug)]
pub struct ScratchWorkspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchWorkspace {
    pub async fn create_in(root: &Path) -> Result<Self, FetchError> {
        tokio::fs::create_dir_all(root).await.map_err(|error| {
            FetchError::unexpected(format!(
                "could not create scratch root {}: {error}",
                root.display()
            ))
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(|error| {
                FetchError::unexpected(format!("could not create scratch workspace: {error}"))
            })?;

        debug!("Scratch workspace created at {:?}", dir.path());
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Files directly inside the workspace with the given extension, sorted.
    pub async fn files_with_extension(&self, extension: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!("Could not list scratch workspace {:?}: {error}", self.path);
                return found;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|value| value.to_str())
                .is_some_and(|value| value.eq_ignore_ascii_case(extension));
            if matches && entry.file_type().await.is_ok_and(|kind| kind.is_file()) {
                found.push(path);
            }
        }

        found.sort();
        found
    }

    /// Opens a file inside the workspace as a byte stream that keeps the
    /// workspace alive until the stream itself is dropped.
    pub async fn into_file_stream(self, path: &Path) -> Result<(WorkspaceStream, u64), FetchError> {
        let file = File::open(path).await.map_err(|error| {
            FetchError::unexpected(format!("could not open {}: {error}", path.display()))
        })?;
        let length = file
            .metadata()
            .await
            .map_err(|error| {
                FetchError::unexpected(format!("could not stat {}: {error}", path.display()))
            })?
            .len();

        Ok((
            WorkspaceStream {
                inner: ReaderStream::new(file),
                _workspace: self,
            },
            length,
        ))
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || drop(dir));
            }
            Err(_) => drop(dir),
        }
    }
}

/// File body that owns the workspace it was read from.
pub struct WorkspaceStream {
    inner: ReaderStream<File>,
    _workspace: ScratchWorkspace,
}

impl Stream for WorkspaceStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Removes workspaces a previous process left behind (crash, kill -9).
pub async fn cleanup_stale_workspaces(root: &Path, older_than: Duration) {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open scratch root for cleanup: {error}");
            }
            return;
        }
    };

    let now = std::time::SystemTime::now();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not iterate scratch root for cleanup: {error}");
                break;
            }
        };

        let path = entry.path();
        let is_workspace = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(WORKSPACE_PREFIX));
        if !is_workspace {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if !metadata.is_dir() || age < older_than {
            continue;
        }

        if let Err(error) = tokio::fs::remove_dir_all(&path).await
            && error.kind() != ErrorKind::NotFound
        {
            warn!("Could not remove stale workspace {:?}: {error}", path);
        }
    }
}
