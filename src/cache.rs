//! Model cache management for downloaded models
//!
//! Models live as flat `<name>.onnx` files in one directory, each with a
//! `<name>.json` metadata sidecar written by the downloader:
//! - `$U2NET_HOME` when set
//! - `~/.u2net` otherwise

use crate::error::{BgRemovalError, Result};
use crate::models::ModelKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Cache directory override
pub const ENV_CACHE_DIR: &str = "U2NET_HOME";

/// Default cache directory name under the home directory
const DEFAULT_CACHE_DIR_NAME: &str = ".u2net";

/// Metadata sidecar stored next to each downloaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub model: ModelKind,
    /// Download source
    pub url: String,
    /// Hex-encoded SHA-256 of the ONNX file
    pub sha256: String,
    /// Size of the ONNX file in bytes
    pub size_bytes: u64,
    /// Download completion time
    pub downloaded_at: DateTime<Utc>,
}

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub model: ModelKind,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Sidecar contents, absent for files placed in the cache by hand
    pub metadata: Option<ModelMetadata>,
}

/// Model cache manager
#[derive(Debug)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache rooted at the default directory, creating it if needed
    ///
    /// # Errors
    /// - Home directory cannot be determined and `U2NET_HOME` is unset
    /// - Cache directory cannot be created
    pub fn new() -> Result<Self> {
        let cache_dir = Self::resolve_cache_dir(std::env::var_os(ENV_CACHE_DIR).map(PathBuf::from))?;
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Create a cache rooted at an explicit directory, creating it if needed
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create cache directory", cache_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Resolve the cache directory from an optional override
    fn resolve_cache_dir(override_dir: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = override_dir.filter(|dir| !dir.as_os_str().is_empty()) {
            return Ok(dir);
        }

        dirs::home_dir()
            .map(|home| home.join(DEFAULT_CACHE_DIR_NAME))
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine home directory. Set the {ENV_CACHE_DIR} environment variable."
                ))
            })
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the ONNX file for a model (may not exist)
    #[must_use]
    pub fn model_path(&self, model: ModelKind) -> PathBuf {
        self.cache_dir.join(model.file_name())
    }

    /// Path of the metadata sidecar for a model (may not exist)
    #[must_use]
    pub fn metadata_path(&self, model: ModelKind) -> PathBuf {
        self.cache_dir.join(format!("{}.json", model.name()))
    }

    /// `true` if the model file exists and is non-empty
    #[must_use]
    pub fn is_model_cached(&self, model: ModelKind) -> bool {
        fs::metadata(self.model_path(model))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Read the metadata sidecar of a model, if present
    pub fn read_metadata(&self, model: ModelKind) -> Result<Option<ModelMetadata>> {
        let path = self.metadata_path(model);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| BgRemovalError::file_io_error("read model metadata", &path, &e))?;
        let metadata = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::model(format!(
                "Corrupt model metadata '{}': {e}",
                path.display()
            ))
        })?;
        Ok(Some(metadata))
    }

    /// Write the metadata sidecar of a model
    pub fn write_metadata(&self, metadata: &ModelMetadata) -> Result<()> {
        let path = self.metadata_path(metadata.model);
        let content = serde_json::to_string_pretty(metadata)
            .map_err(|e| BgRemovalError::internal(format!("Failed to serialize metadata: {e}")))?;
        fs::write(&path, content)
            .map_err(|e| BgRemovalError::file_io_error("write model metadata", &path, &e))
    }

    /// List every catalogue model present in the cache
    pub fn cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        for model in ModelKind::ALL {
            if !self.is_model_cached(model) {
                continue;
            }
            let path = self.model_path(model);
            let size_bytes = fs::metadata(&path)
                .map_err(|e| BgRemovalError::file_io_error("inspect cached model", &path, &e))?
                .len();
            let metadata = match self.read_metadata(model) {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::warn!("Ignoring metadata for {model}: {e}");
                    None
                },
            };
            models.push(CachedModelInfo {
                model,
                path,
                size_bytes,
                metadata,
            });
        }
        Ok(models)
    }

    /// Remove a model and its sidecar; returns whether anything was removed
    pub fn clear_model(&self, model: ModelKind) -> Result<bool> {
        let mut removed = false;
        for path in [self.model_path(model), self.metadata_path(model)] {
            if path.exists() {
                fs::remove_file(&path)
                    .map_err(|e| BgRemovalError::file_io_error("remove cached file", &path, &e))?;
                removed = true;
            }
        }
        Ok(removed)
    }
}

/// Format byte size for display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let suffix = UNITS.get(unit).copied().unwrap_or("B");
    if unit == 0 {
        format!("{bytes} {suffix}")
    } else {
        format!("{size:.1} {suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_cache() -> (TempDir, ModelCache) {
        let dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(dir.path()).unwrap();
        (dir, cache)
    }

    fn sample_metadata(model: ModelKind) -> ModelMetadata {
        ModelMetadata {
            model,
            url: model.url(),
            sha256: "ab".repeat(32),
            size_bytes: 4,
            downloaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_override_wins() {
        let dir = ModelCache::resolve_cache_dir(Some(PathBuf::from("/opt/models"))).unwrap();
        assert_eq!(dir, PathBuf::from("/opt/models"));
    }

    #[test]
    fn test_empty_override_falls_back_to_home() {
        if let Some(home) = dirs::home_dir() {
            let dir = ModelCache::resolve_cache_dir(Some(PathBuf::new())).unwrap();
            assert_eq!(dir, home.join(".u2net"));
        }
    }

    #[test]
    fn test_custom_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = ModelCache::with_custom_cache_dir(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(cache.cache_dir(), nested.as_path());
    }

    #[test]
    fn test_model_paths() {
        let (dir, cache) = temp_cache();
        assert_eq!(cache.model_path(ModelKind::U2net), dir.path().join("u2net.onnx"));
        assert_eq!(
            cache.metadata_path(ModelKind::IsnetGeneralUse),
            dir.path().join("isnet-general-use.json")
        );
    }

    #[test]
    fn test_is_model_cached() {
        let (_dir, cache) = temp_cache();
        assert!(!cache.is_model_cached(ModelKind::U2netp));

        fs::write(cache.model_path(ModelKind::U2netp), b"").unwrap();
        assert!(!cache.is_model_cached(ModelKind::U2netp), "empty file is not a model");

        fs::write(cache.model_path(ModelKind::U2netp), b"onnx").unwrap();
        assert!(cache.is_model_cached(ModelKind::U2netp));
    }

    #[test]
    fn test_metadata_round_trip_and_listing() {
        let (_dir, cache) = temp_cache();
        fs::write(cache.model_path(ModelKind::Silueta), b"onnx").unwrap();
        let metadata = sample_metadata(ModelKind::Silueta);
        cache.write_metadata(&metadata).unwrap();

        assert_eq!(cache.read_metadata(ModelKind::Silueta).unwrap(), Some(metadata.clone()));
        assert_eq!(cache.read_metadata(ModelKind::U2net).unwrap(), None);

        let models = cache.cached_models().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model, ModelKind::Silueta);
        assert_eq!(models[0].size_bytes, 4);
        assert_eq!(models[0].metadata, Some(metadata));
    }

    #[test]
    fn test_corrupt_metadata_is_reported_but_not_fatal_for_listing() {
        let (_dir, cache) = temp_cache();
        fs::write(cache.model_path(ModelKind::U2net), b"onnx").unwrap();
        fs::write(cache.metadata_path(ModelKind::U2net), b"{not json").unwrap();

        assert!(cache.read_metadata(ModelKind::U2net).is_err());
        let models = cache.cached_models().unwrap();
        assert_eq!(models.len(), 1);
        assert!(models[0].metadata.is_none());
    }

    #[test]
    fn test_clear_model() {
        let (_dir, cache) = temp_cache();
        fs::write(cache.model_path(ModelKind::U2net), b"onnx").unwrap();
        cache.write_metadata(&sample_metadata(ModelKind::U2net)).unwrap();

        assert!(cache.clear_model(ModelKind::U2net).unwrap());
        assert!(!cache.is_model_cached(ModelKind::U2net));
        assert!(!cache.metadata_path(ModelKind::U2net).exists());
        assert!(!cache.clear_model(ModelKind::U2net).unwrap());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(176 * 1024 * 1024), "176.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
