//! Helpers shared by unit tests.

use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

use crate::artifacts::{ArtifactQueue, MemoryStorage, QueueSettings, ThumbnailSpec};
use crate::reliability::RetryConfig;
use crate::store::Database;

/// Encode a solid-color PNG.
pub fn png_bytes(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([shade, 90, 255 - shade, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Fast retries and tiny thumbnails.
pub fn quick_settings() -> QueueSettings {
    QueueSettings {
        retry: RetryConfig::quick(),
        thumbnail: ThumbnailSpec { size: 16, quality: 80 },
    }
}

/// In-memory database, memory storage and a queue over both.
pub fn memory_queue() -> (Database, Arc<MemoryStorage>, ArtifactQueue) {
    let db = Database::in_memory().unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let queue = ArtifactQueue::new(db.clone(), storage.clone(), quick_settings());
    (db, storage, queue)
}
