//! Model downloading
//!
//! Streams a model file into the cache with progress reporting. The body is
//! written to a temporary file inside the cache directory and renamed into
//! place only once complete, so an interrupted download never leaves a
//! truncated model behind.

use crate::cache::{ModelCache, ModelMetadata};
use crate::error::{BgRemovalError, Result};
use crate::models::ModelKind;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const CHUNK_SIZE: usize = 64 * 1024;

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Create a progress indicator, a no-op unless the `cli` feature is enabled
    #[must_use]
    pub fn new(visible: bool) -> Self {
        #[cfg(feature = "cli")]
        {
            if visible {
                let pb = ProgressBar::new(0);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                return Self::Indicatif(pb);
            }
        }
        let _ = visible;
        Self::NoOp
    }

    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// Outcome of streaming one file to disk
#[derive(Debug, Clone, PartialEq, Eq)]
struct DownloadedFile {
    sha256: String,
    size_bytes: u64,
}

impl ModelDownloader {
    /// Create a downloader over the default model cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader over an explicit cache
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Return the cached model file, downloading it first if missing or corrupt
    pub async fn ensure_model(&self, model: ModelKind, show_progress: bool) -> Result<PathBuf> {
        self.ensure_model_from(model, &model.url(), show_progress)
            .await
    }

    /// Like [`Self::ensure_model`], fetching from an explicit URL when needed
    pub async fn ensure_model_from(
        &self,
        model: ModelKind,
        url: &str,
        show_progress: bool,
    ) -> Result<PathBuf> {
        if let Some(path) = self.verified_cached_model(model)? {
            log::debug!("Model {} already cached", model);
            return Ok(path);
        }

        log::info!("Model {} not cached, downloading", model);
        self.download_model_from(model, url, show_progress).await
    }

    /// Cached model path if the file is present and matches its recorded SHA-256
    ///
    /// Files without a metadata sidecar (placed by hand) are trusted as is.
    /// A mismatching or unreadable sidecar yields `None` so the caller fetches
    /// a fresh copy.
    pub fn verified_cached_model(&self, model: ModelKind) -> Result<Option<PathBuf>> {
        if !self.cache.is_model_cached(model) {
            return Ok(None);
        }
        let path = self.cache.model_path(model);

        let metadata = match self.cache.read_metadata(model) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Unreadable metadata for {model}, downloading again: {e}");
                return Ok(None);
            },
        };

        match metadata {
            Some(metadata) if !verify_file_integrity(&path, Some(&metadata.sha256))? => {
                log::warn!("Cached model {model} failed its integrity check, downloading again");
                Ok(None)
            },
            _ => Ok(Some(path)),
        }
    }

    /// Download a model from its catalogue URL, replacing any cached copy
    pub async fn download_model(&self, model: ModelKind, show_progress: bool) -> Result<PathBuf> {
        self.download_model_from(model, &model.url(), show_progress)
            .await
    }

    /// Download a model from an explicit URL (for mirrors), replacing any cached copy
    pub async fn download_model_from(
        &self,
        model: ModelKind,
        url: &str,
        show_progress: bool,
    ) -> Result<PathBuf> {
        let final_path = self.cache.model_path(model);
        let progress = ProgressIndicator::new(show_progress);
        progress.set_message(format!("Downloading {}", model.file_name()));

        match self.download_file(url, &final_path, &progress).await {
            Ok(downloaded) => {
                self.cache.write_metadata(&ModelMetadata {
                    model,
                    url: url.to_string(),
                    sha256: downloaded.sha256,
                    size_bytes: downloaded.size_bytes,
                    downloaded_at: chrono::Utc::now(),
                })?;
                progress.finish_with_message(format!("Downloaded {}", model.file_name()));
                log::info!("Successfully downloaded model {} to {}", model, final_path.display());
                Ok(final_path)
            },
            Err(e) => {
                progress.finish_with_message("Download failed".to_string());
                Err(e)
            },
        }
    }

    /// Stream `url` into `destination` through a temporary file in the same directory
    async fn download_file(
        &self,
        url: &str,
        destination: &Path,
        progress: &ProgressIndicator,
    ) -> Result<DownloadedFile> {
        log::debug!("Downloading: {} -> {}", url, destination.display());

        let parent = destination
            .parent()
            .ok_or_else(|| BgRemovalError::internal("Download destination has no parent"))?;
        fs::create_dir_all(parent)
            .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("HTTP error {} for {}", response.status(), url),
                std::io::Error::new(std::io::ErrorKind::Other, "HTTP error"),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        // Dropped (and deleted) on any early return below
        let temp_file = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| BgRemovalError::file_io_error("create temporary file", parent, &e))?;
        let std_file = temp_file
            .as_file()
            .try_clone()
            .map_err(|e| BgRemovalError::file_io_error("open temporary file", temp_file.path(), &e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", temp_file.path(), &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", temp_file.path(), &e))?;
        drop(file);

        if downloaded == 0 {
            return Err(BgRemovalError::network_error(
                format!("Empty response body from {url}"),
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no data"),
            ));
        }

        temp_file
            .persist(destination)
            .map_err(|e| BgRemovalError::file_io_error("move download into cache", destination, &e.error))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, destination.display());
        Ok(DownloadedFile {
            sha256: format!("{:x}", hasher.finalize()),
            size_bytes: downloaded,
        })
    }
}

/// Verify a file against an optional hex-encoded SHA-256
///
/// Returns `Ok(true)` when no hash is given.
pub fn verify_file_integrity(file_path: &Path, expected_sha256: Option<&str>) -> Result<bool> {
    let Some(expected) = expected_sha256 else {
        return Ok(true);
    };

    let contents = fs::read(file_path).map_err(|e| {
        BgRemovalError::file_io_error("read file for verification", file_path, &e)
    })?;

    let actual = format!("{:x}", Sha256::digest(&contents));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(true)
    } else {
        log::warn!(
            "File integrity check failed for {}: expected {}, got {}",
            file_path.display(),
            expected,
            actual
        );
        Ok(false)
    }
}
