//! Application wiring.
//!
//! [`Pinboard`] owns one instance of every component, built with explicit
//! dependencies. Opening it runs the cold-start contract: the color table
//! is seeded and every request left over from a previous run is applied
//! before the handle is returned.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

use crate::artifacts::{ArtifactQueue, ArtifactStorage, FilesystemStorage, QueueSettings};
use crate::bus::{Event, NotificationBus};
use crate::cache::{ImageCache, ImageState, ReadyCallback};
use crate::colors::ColorTable;
use crate::config::Config;
use crate::constants::{DEFAULT_CACHE_CAPACITY, IMAGES_DIR, THUMBNAIL_PREFIX};
use crate::error::Error;
use crate::paths;
use crate::pins::{Pin, PinRepository};
use crate::store::Database;

/// Component settings, usually derived from [`Config::settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Decoded images held in memory.
    pub cache_capacity: usize,
    pub queue: QueueSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            queue: QueueSettings::default(),
        }
    }
}

/// A ready-to-use pinboard.
#[derive(Clone)]
pub struct Pinboard {
    db: Database,
    bus: Arc<NotificationBus>,
    colors: ColorTable,
    queue: ArtifactQueue,
    cache: ImageCache,
    pins: PinRepository,
}

impl Pinboard {
    /// Open the pinboard in the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data directory cannot be resolved or created
    /// - The database cannot be opened or migrated
    /// - The color table cannot be seeded
    /// - The recovery drain cannot read the queue
    pub async fn open(config: &Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let db = Database::open(paths::get_database_path(&data_dir))?;
        let images_dir = paths::get_images_dir(&data_dir);
        let storage = FilesystemStorage::open(&images_dir).with_context(|| {
            format!("Failed to open image directory: {}", images_dir.display())
        })?;

        Self::open_with(db, Arc::new(storage), config.settings()).await
    }

    /// Open with injected backends.
    ///
    /// # Errors
    ///
    /// Returns an error if seeding colors or the recovery drain fails.
    pub async fn open_with(
        db: Database,
        storage: Arc<dyn ArtifactStorage>,
        settings: Settings,
    ) -> Result<Self> {
        let bus = Arc::new(NotificationBus::new());
        let colors = ColorTable::new(db.clone(), Arc::clone(&bus));
        let queue = ArtifactQueue::new(db.clone(), Arc::clone(&storage), settings.queue);
        let cache = ImageCache::new(storage, settings.cache_capacity);
        queue.observe(Arc::new(cache.clone()));
        let pins = PinRepository::new(db.clone(), queue.clone(), Arc::clone(&bus));

        colors
            .bootstrap_if_empty()
            .context("Failed to seed color table")?;

        let recovered = queue
            .drain()
            .await
            .context("Failed to replay pending image operations")?;
        if recovered.total() > 0 {
            info!(
                applied = recovered.applied,
                dead_lettered = recovered.dead_lettered,
                "Recovered pending image operations"
            );
        }

        queue.start();
        info!("Pinboard ready");

        Ok(Self {
            db,
            bus,
            colors,
            queue,
            cache,
            pins,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn queue(&self) -> &ArtifactQueue {
        &self.queue
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn pins(&self) -> &PinRepository {
        &self.pins
    }

    /// Full-size image state for `pin`; see [`ImageCache::fetch`].
    pub fn image_state(&self, pin: &Pin, on_ready: ReadyCallback) -> ImageState {
        self.cache.fetch(pin.image_name.as_deref(), on_ready)
    }

    /// Thumbnail state for `pin`; see [`ImageCache::fetch_thumbnail`].
    pub fn thumbnail_state(&self, pin: &Pin, on_ready: ReadyCallback) -> ImageState {
        self.cache
            .fetch_thumbnail(pin.image_name.as_deref(), on_ready)
    }

    /// Ask the map to center on a coordinate.
    pub fn recenter(&self, latitude: f64, longitude: f64) {
        self.bus.publish(Event::RecenterMap {
            latitude,
            longitude,
        });
    }

    /// Check that every referenced image is stored, pending, or
    /// dead-lettered, and that every stored file belongs to a pin or to a
    /// queued request.
    ///
    /// Violations are logged and returned, never repaired.
    ///
    /// # Errors
    ///
    /// Returns an error if pins, storage or the queue cannot be read.
    pub fn audit(&self) -> crate::Result<Vec<Error>> {
        let storage = self.queue.storage();
        // Files before pins: a pin always exists before its image is stored.
        let files = storage
            .list()
            .map_err(|e| Error::storage(IMAGES_DIR, e))?;
        let pins = self.pins.list()?;
        let mut violations = Vec::new();

        for pin in &pins {
            let Some(name) = pin.image_name.as_deref() else {
                continue;
            };
            let stored = storage
                .exists(name)
                .map_err(|e| Error::storage(name, e))?;
            if stored || self.queue.has_pending_save(name)? || self.queue.has_dead_save(name)? {
                continue;
            }

            let message = format!(
                "pin {} references image '{name}' which is neither stored nor queued",
                pin.id
            );
            error!(pin_id = %pin.id, image = name, "Image consistency violation");
            violations.push(Error::ConsistencyViolation(message));
        }

        let referenced: HashSet<&str> = pins
            .iter()
            .filter_map(|pin| pin.image_name.as_deref())
            .collect();
        for file in &files {
            let image = file.strip_prefix(THUMBNAIL_PREFIX).unwrap_or(file.as_str());
            if referenced.contains(image) || self.queue.latest_request(image)?.is_some() {
                continue;
            }
            // Deleted while we were looking.
            if !storage.exists(file).map_err(|e| Error::storage(file, e))? {
                continue;
            }

            let message = format!("stored file '{file}' belongs to no pin and no queued request");
            error!(file = %file, "Unreferenced image artifact");
            violations.push(Error::ConsistencyViolation(message));
        }

        if violations.is_empty() {
            info!("Audit found no consistency violations");
        }
        Ok(violations)
    }

    /// Stop the queue worker after its current request.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        info!("Pinboard shut down");
    }
}

impl std::fmt::Debug for Pinboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pinboard")
            .field("db", &self.db)
            .field("queue", &self.queue)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
