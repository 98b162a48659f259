//! Identifier resolution.
//!
//! An [`ImageSource`] maps request identifiers to something a
//! [`PixelEngine`](crate::derive::PixelEngine) can open and reports the
//! pixel dimensions needed for info documents:
//!
//! - [`FilesystemSource`] - image files in one directory, identified by
//!   file name without extension
//! - [`GeneratorSource`] - the named [`PixelGen`] patterns
//!
//! Reading dimensions means decoding an image header, so results are kept
//! in a [`DimensionCache`].

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::debug;

use crate::derive::PixelGen;
use crate::error::IiifError;

/// Default number of entries in the dimension cache.
pub const DEFAULT_DIMENSION_CACHE_CAPACITY: usize = 1000;

/// Source file extensions, in lookup order.
pub const SOURCE_EXTENSIONS: [&str; 7] = ["jpg", "png", "tif", "jpeg", "tiff", "gif", "webp"];

// =============================================================================
// ImageSource Trait
// =============================================================================

/// Resolves identifiers to engine inputs.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Engine input for `identifier`, or a 404 error.
    async fn resolve(&self, identifier: &str) -> Result<PathBuf, IiifError>;

    /// All identifiers this source serves, sorted.
    async fn identifiers(&self) -> Result<Vec<String>, IiifError>;

    /// Full resolution `(width, height)` of a resolved input.
    async fn dimensions(&self, path: &Path) -> Result<(u32, u32), IiifError>;
}

fn not_found(identifier: &str) -> IiifError {
    IiifError::not_found(format!("Image resource '{}' not found", identifier))
}

/// An identifier that names a plain file inside the source directory.
fn is_plain_name(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.starts_with('.')
        && !identifier.contains(['/', '\\', '\0'])
}

// =============================================================================
// FilesystemSource
// =============================================================================

/// Images stored as files in a single directory.
#[derive(Debug, Clone)]
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ImageSource for FilesystemSource {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn resolve(&self, identifier: &str) -> Result<PathBuf, IiifError> {
        if !is_plain_name(identifier) {
            return Err(not_found(identifier));
        }
        for ext in SOURCE_EXTENSIONS {
            let path = self.root.join(format!("{}.{}", identifier, ext));
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                if meta.is_file() {
                    return Ok(path);
                }
            }
        }
        Err(not_found(identifier))
    }

    async fn identifiers(&self) -> Result<Vec<String>, IiifError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut identifiers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e));
            let stem = path.file_stem().and_then(|s| s.to_str());
            if let (true, Some(stem)) = (known, stem) {
                if is_plain_name(stem) {
                    identifiers.push(stem.to_string());
                }
            }
        }
        identifiers.sort();
        identifiers.dedup();
        Ok(identifiers)
    }

    async fn dimensions(&self, path: &Path) -> Result<(u32, u32), IiifError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || image::image_dimensions(&path))
            .await
            .map_err(|e| IiifError::internal(format!("Dimension task failed: {}", e)))?
            .map_err(IiifError::from)
    }
}

// =============================================================================
// GeneratorSource
// =============================================================================

/// The built-in generated patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratorSource;

#[async_trait]
impl ImageSource for GeneratorSource {
    fn name(&self) -> &'static str {
        "generator"
    }

    async fn resolve(&self, identifier: &str) -> Result<PathBuf, IiifError> {
        identifier
            .parse::<PixelGen>()
            .map(|gen| PathBuf::from(gen.name()))
            .map_err(|_| not_found(identifier))
    }

    async fn identifiers(&self) -> Result<Vec<String>, IiifError> {
        let mut names: Vec<String> = PixelGen::ALL.iter().map(|g| g.name().to_string()).collect();
        names.sort();
        Ok(names)
    }

    async fn dimensions(&self, path: &Path) -> Result<(u32, u32), IiifError> {
        let name = path.to_str().unwrap_or_default();
        Ok(name.parse::<PixelGen>()?.size())
    }
}

// =============================================================================
// DimensionCache
// =============================================================================

/// LRU cache of image dimensions keyed by resolved path.
pub struct DimensionCache {
    cache: RwLock<LruCache<PathBuf, (u32, u32)>>,
    capacity: usize,
}

impl DimensionCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let entries = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            capacity: entries.get(),
        }
    }

    /// Cached dimensions; marks the entry as recently used.
    pub async fn get(&self, path: &Path) -> Option<(u32, u32)> {
        let mut cache = self.cache.write().await;
        cache.get(path).copied()
    }

    pub async fn put(&self, path: PathBuf, dimensions: (u32, u32)) {
        let mut cache = self.cache.write().await;
        cache.put(path, dimensions);
    }

    /// Dimensions of `path`, asking `source` on a miss.
    pub async fn get_or_load(
        &self,
        source: &dyn ImageSource,
        path: &Path,
    ) -> Result<(u32, u32), IiifError> {
        if let Some(dims) = self.get(path).await {
            return Ok(dims);
        }
        let dims = source.dimensions(path).await?;
        debug!(
            source = source.name(),
            path = %path.display(),
            width = dims.0,
            height = dims.1,
            "cached image dimensions"
        );
        self.put(path.to_path_buf(), dims).await;
        Ok(dims)
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DimensionCache {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION_CACHE_CAPACITY)
    }
}

// =============================================================================
// Tests
// =============================================================================
