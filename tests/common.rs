//! Shared helpers for pinboard integration tests.
//!
//! A [`TestHome`] is a temporary data directory holding a real SQLite file
//! and a real image directory, so a test can drop every handle ("crash")
//! and reopen the same state.

#![allow(dead_code)]

use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use pinboard::artifacts::{
    ArtifactQueue, ArtifactStorage, FilesystemStorage, QueueSettings, ThumbnailSpec,
};
use pinboard::bus::NotificationBus;
use pinboard::pins::PinRepository;
use pinboard::reliability::RetryConfig;
use pinboard::store::Database;
use pinboard::{Pinboard, Settings, paths};

/// Encode a solid-color PNG.
pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([shade, 120, 255 - shade, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

/// Fast retries and small thumbnails.
pub fn test_settings() -> Settings {
    Settings {
        cache_capacity: 8,
        queue: QueueSettings {
            retry: RetryConfig::quick(),
            thumbnail: ThumbnailSpec {
                size: 24,
                quality: 80,
            },
        },
    }
}

/// A temporary pinboard data directory.
pub struct TestHome {
    dir: TempDir,
}

impl TestHome {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        paths::get_database_path(self.dir.path())
    }

    pub fn images_dir(&self) -> PathBuf {
        paths::get_images_dir(self.dir.path())
    }

    pub fn database(&self) -> Database {
        Database::open(self.db_path()).expect("open database")
    }

    pub fn storage(&self) -> Arc<FilesystemStorage> {
        Arc::new(FilesystemStorage::open(self.images_dir()).expect("open storage"))
    }

    /// Open a full pinboard: colors seeded, recovery drain done, worker running.
    pub async fn open(&self) -> Pinboard {
        self.open_with_storage(self.storage()).await
    }

    pub async fn open_with_storage(&self, storage: Arc<dyn ArtifactStorage>) -> Pinboard {
        Pinboard::open_with(self.database(), storage, test_settings())
            .await
            .expect("open pinboard")
    }

    /// Components with no worker and no recovery drain: whatever is
    /// enqueued stays pending until someone drains, like a process that dies
    /// right after committing.
    pub fn offline(&self) -> Offline {
        let db = self.database();
        let storage = self.storage();
        let queue = ArtifactQueue::new(db.clone(), storage.clone(), test_settings().queue);
        let pins = PinRepository::new(db.clone(), queue.clone(), Arc::new(NotificationBus::new()));
        Offline {
            db,
            storage,
            queue,
            pins,
        }
    }
}

/// Pin repository and queue without a running worker.
pub struct Offline {
    pub db: Database,
    pub storage: Arc<FilesystemStorage>,
    pub queue: ArtifactQueue,
    pub pins: PinRepository,
}

/// Count rows in the artifact request table, any status.
pub fn request_rows(db: &Database) -> i64 {
    db.with_conn(|conn| {
        conn.query_row("SELECT COUNT(*) FROM artifact_requests", [], |r| r.get(0))
    })
    .expect("count requests")
}

/// Wait until `condition` holds, polling.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
