//! The output directory, keyed by each asset URL's final path segment.
//!
//! Presence of a file is the only record of a download. Files are only ever
//! created, never replaced: two URLs ending in the same segment collide and
//! the second one is reported as already present.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, FetchError, SaveError, StoreError};

#[derive(Debug, Clone)]
pub struct DownloadStore {
    dir: PathBuf,
}

impl DownloadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the output directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| Error::OutputDir {
                path: self.dir.clone(),
                source,
            })
    }

    /// Target path for an asset: the URL's last path segment, verbatim.
    pub fn path_for(&self, asset_url: &Url) -> Result<PathBuf, StoreError> {
        let name = asset_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(|| StoreError::NoFileName(asset_url.clone()))?;
        Ok(self.dir.join(name))
    }

    /// Whether anything is at `path`. Empty files count.
    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Writes `body` to `path` unless something is already there.
    ///
    /// Returns `Ok(false)` without touching an existing file. If the stream
    /// fails part way, the file this call created is removed again.
    pub async fn save<S>(&self, path: &Path, body: S) -> Result<bool, SaveError>
    where
        S: Stream<Item = Result<Bytes, FetchError>> + Send,
    {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "target exists, not writing");
                return Ok(false);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                }
                .into());
            }
        };

        let written = async {
            let mut body = std::pin::pin!(body);
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await.map_err(|source| io_error(path, source))?;
            }
            file.flush().await.map_err(|source| io_error(path, source))?;
            Ok::<(), SaveError>(())
        }
        .await;

        if let Err(err) = written {
            drop(file);
            if let Err(e) = fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "could not remove partial file");
            }
            return Err(err);
        }

        Ok(true)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SaveError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
    .into()
}
