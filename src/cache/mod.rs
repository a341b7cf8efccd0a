//! Two-tier image cache.
//!
//! Decoded images are kept in a bounded in-memory LRU (moka) in front of
//! artifact storage. The cache never writes artifacts; it learns about new
//! and removed images by observing the artifact queue.
//!
//! Lookups that miss memory are resolved on the blocking pool and reported
//! through a callback. A lookup that finds nothing on disk leaves the
//! callback registered against the filename: when the queue later applies
//! the matching save, the callback fires again with the loaded image. A
//! delete of that name ends the wait.

use image::DynamicImage;
use moka::policy::EvictionPolicy;
use moka::sync::Cache as MokaCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::artifacts::{ArtifactCommand, ArtifactObserver, ArtifactStorage, thumbnail_name};
use crate::constants::MAX_WAITERS_PER_IMAGE;

#[cfg(test)]
mod tests;

/// A decoded image together with its encoded bytes.
pub struct CachedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

impl CachedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl fmt::Debug for CachedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedImage")
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Result of an image lookup.
#[derive(Debug, Clone)]
pub enum ImageState {
    /// The pin has no image.
    NoName,
    /// Being read from storage; the callback will be told the outcome.
    Loading,
    Loaded(Arc<CachedImage>),
    /// Not on storage (yet).
    Missing,
}

impl ImageState {
    /// The image, if loaded.
    pub fn image(&self) -> Option<&Arc<CachedImage>> {
        match self {
            Self::Loaded(image) => Some(image),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Callback receiving settled lookup results.
pub type ReadyCallback = Arc<dyn Fn(ImageState) + Send + Sync>;

struct CacheInner {
    storage: Arc<dyn ArtifactStorage>,
    memory: MokaCache<String, Arc<CachedImage>>,
    waiters: Mutex<HashMap<String, Vec<ReadyCallback>>>,
}

/// In-memory + on-disk image cache.
///
/// `ImageCache` is `Clone`; clones share the same state.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<CacheInner>,
}

impl ImageCache {
    /// Create a cache holding at most `capacity` decoded images in memory.
    pub fn new(storage: Arc<dyn ArtifactStorage>, capacity: usize) -> Self {
        let memory = MokaCache::builder()
            .max_capacity(capacity.max(1) as u64)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            inner: Arc::new(CacheInner {
                storage,
                memory,
                waiters: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Look up a full-size image.
    ///
    /// Returns `NoName` for `None` and `Loaded` on a memory hit, without
    /// calling `on_ready`. Otherwise returns `Loading` and reports the
    /// outcome through `on_ready` from the blocking pool (or inline when
    /// called outside a Tokio runtime, in which case the settled state is
    /// also returned).
    pub fn fetch(&self, filename: Option<&str>, on_ready: ReadyCallback) -> ImageState {
        let Some(filename) = filename else {
            return ImageState::NoName;
        };
        if let Some(image) = self.inner.memory.get(filename) {
            trace!(filename, "Image cache hit");
            return ImageState::Loaded(image);
        }

        let inner = Arc::clone(&self.inner);
        let filename = filename.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || inner.resolve(&filename, on_ready));
                ImageState::Loading
            },
            Err(_) => inner.resolve(&filename, on_ready),
        }
    }

    /// Look up the thumbnail derived from `image_name`.
    ///
    /// Thumbnails are separate cache entries; a missing thumbnail is never
    /// produced by downscaling the full image here.
    pub fn fetch_thumbnail(&self, image_name: Option<&str>, on_ready: ReadyCallback) -> ImageState {
        let thumb = image_name.map(thumbnail_name);
        self.fetch(thumb.as_deref(), on_ready)
    }

    /// Settled lookup on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the blocking task panics.
    pub async fn load(&self, filename: Option<&str>) -> crate::Result<ImageState> {
        let Some(filename) = filename else {
            return Ok(ImageState::NoName);
        };
        let inner = Arc::clone(&self.inner);
        let filename = filename.to_string();
        Ok(tokio::task::spawn_blocking(move || inner.load_blocking(&filename)).await?)
    }

    /// Settled lookup on the calling thread.
    pub fn load_blocking(&self, filename: Option<&str>) -> ImageState {
        filename.map_or(ImageState::NoName, |name| self.inner.load_blocking(name))
    }

    /// Memory tier only; never touches storage.
    pub fn peek(&self, filename: &str) -> Option<Arc<CachedImage>> {
        self.inner.memory.get(filename)
    }

    /// Drop `filename` from memory.
    pub fn invalidate(&self, filename: &str) {
        self.inner.memory.invalidate(filename);
    }

    /// Images currently held in memory.
    pub fn len(&self) -> u64 {
        self.inner.memory.run_pending_tasks();
        self.inner.memory.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Callbacks still waiting for `filename` to appear.
    pub fn waiting(&self, filename: &str) -> usize {
        self.inner.waiters.lock().get(filename).map_or(0, Vec::len)
    }
}

impl CacheInner {
    fn load_blocking(&self, filename: &str) -> ImageState {
        if let Some(image) = self.memory.get(filename) {
            return ImageState::Loaded(image);
        }

        let bytes = match self.storage.read(filename) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return ImageState::Missing,
            Err(e) => {
                warn!(filename, error = %e, "Failed to read image");
                return ImageState::Missing;
            },
        };

        match image::load_from_memory(&bytes) {
            Ok(image) => {
                let cached = Arc::new(CachedImage {
                    filename: filename.to_string(),
                    bytes,
                    image,
                });
                self.memory.insert(filename.to_string(), Arc::clone(&cached));
                // A delete applied since the read already ran its
                // invalidation; don't keep what it removed.
                if !self.storage.exists(filename).unwrap_or(false) {
                    self.memory.invalidate(filename);
                    debug!(filename, "Image deleted while loading");
                    return ImageState::Missing;
                }
                debug!(filename, "Image loaded into cache");
                ImageState::Loaded(cached)
            },
            Err(e) => {
                warn!(filename, error = %e, "Stored image could not be decoded");
                ImageState::Missing
            },
        }
    }

    fn resolve(&self, filename: &str, on_ready: ReadyCallback) -> ImageState {
        let state = self.load_blocking(filename);
        on_ready(state.clone());

        if matches!(state, ImageState::Missing) {
            self.register(filename, on_ready);

            // A save applied between the read and the registration would
            // otherwise never reach this waiter.
            if self.storage.exists(filename).unwrap_or(false) {
                self.wake_waiters(filename);
            }
        }
        state
    }

    /// Keep `on_ready` for `filename`, once, within the per-image cap.
    fn register(&self, filename: &str, on_ready: ReadyCallback) {
        let mut waiters = self.waiters.lock();
        let waiting = waiters.entry(filename.to_string()).or_default();
        if waiting.iter().any(|known| Arc::ptr_eq(known, &on_ready)) {
            return;
        }
        if waiting.len() >= MAX_WAITERS_PER_IMAGE {
            waiting.remove(0);
            trace!(filename, "Dropped oldest image waiter");
        }
        waiting.push(on_ready);
    }

    fn forget_waiters(&self, filename: &str) {
        if let Some(dropped) = self.waiters.lock().remove(filename) {
            debug!(filename, waiters = dropped.len(), "Image deleted; dropped waiters");
        }
    }

    fn wake_waiters(&self, filename: &str) {
        let waiting = self.waiters.lock().remove(filename).unwrap_or_default();
        if waiting.is_empty() {
            return;
        }

        match self.load_blocking(filename) {
            state @ ImageState::Loaded(_) => {
                debug!(filename, waiters = waiting.len(), "Resolving image waiters");
                for callback in waiting {
                    callback(state.clone());
                }
            },
            // Removed again before we got to it; keep waiting.
            _ => {
                for callback in waiting {
                    self.register(filename, callback);
                }
            },
        }
    }
}

impl ArtifactObserver for ImageCache {
    fn artifact_applied(&self, command: ArtifactCommand, filename: &str) {
        let thumb = thumbnail_name(filename);
        self.inner.memory.invalidate(filename);
        self.inner.memory.invalidate(&thumb);

        if command == ArtifactCommand::Delete {
            self.inner.forget_waiters(filename);
            self.inner.forget_waiters(&thumb);
            return;
        }

        let names = [filename.to_string(), thumb];
        let has_waiters = {
            let waiters = self.inner.waiters.lock();
            names.iter().any(|name| waiters.contains_key(name))
        };
        if !has_waiters {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let wake = move || {
            for name in &names {
                inner.wake_waiters(name);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(wake);
            },
            Err(_) => wake(),
        }
    }
}

impl fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCache")
            .field("entries", &self.inner.memory.entry_count())
            .finish_non_exhaustive()
    }
}
