//! Tests for the image cache.

use super::*;
use crate::artifacts::{MemoryStorage, NewRequest, QueueEvent};
use crate::test_support::{memory_queue, png_bytes};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

fn channel_callback() -> (ReadyCallback, mpsc::UnboundedReceiver<ImageState>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ReadyCallback = Arc::new(move |state| {
        let _ = tx.send(state);
    });
    (callback, rx)
}

async fn next_state(rx: &mut mpsc::UnboundedReceiver<ImageState>) -> ImageState {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("callback not invoked in time")
        .expect("callback dropped")
}

fn noop() -> ReadyCallback {
    Arc::new(|_| {})
}

#[test]
fn test_no_name() {
    let cache = ImageCache::new(Arc::new(MemoryStorage::new()), 4);
    assert!(matches!(cache.fetch(None, noop()), ImageState::NoName));
    assert!(matches!(cache.fetch_thumbnail(None, noop()), ImageState::NoName));
    assert!(matches!(cache.load_blocking(None), ImageState::NoName));
}

#[test]
fn test_load_blocking_populates_memory() {
    let storage = Arc::new(MemoryStorage::new());
    let png = png_bytes(12, 6, 3);
    storage.write("a.jpg", &png).unwrap();
    let cache = ImageCache::new(storage, 4);

    assert!(cache.peek("a.jpg").is_none());
    let state = cache.load_blocking(Some("a.jpg"));
    let image = state.image().unwrap();
    assert_eq!(image.bytes, png);
    assert_eq!((image.width(), image.height()), (12, 6));

    assert!(cache.peek("a.jpg").is_some());
    // Memory hit without a runtime still returns synchronously.
    assert!(cache.fetch(Some("a.jpg"), noop()).is_loaded());
}

#[test]
fn test_undecodable_bytes_are_missing() {
    let storage = Arc::new(MemoryStorage::new());
    storage.write("a.jpg", b"garbage").unwrap();
    let cache = ImageCache::new(storage, 4);

    assert!(matches!(cache.load_blocking(Some("a.jpg")), ImageState::Missing));
    assert!(cache.peek("a.jpg").is_none());
}

#[tokio::test]
async fn test_fetch_miss_reports_through_callback() {
    let storage = Arc::new(MemoryStorage::new());
    storage.write("a.jpg", &png_bytes(4, 4, 1)).unwrap();
    let cache = ImageCache::new(storage, 4);
    let (callback, mut rx) = channel_callback();

    assert!(matches!(cache.fetch(Some("a.jpg"), callback), ImageState::Loading));
    assert!(next_state(&mut rx).await.is_loaded());
    assert_eq!(cache.waiting("a.jpg"), 0);
}

#[tokio::test]
async fn test_missing_then_saved_fires_callback_again() {
    let (_, storage, queue) = memory_queue();
    let cache = ImageCache::new(storage.clone(), 4);
    queue.observe(Arc::new(cache.clone()));
    let (callback, mut rx) = channel_callback();

    cache.fetch(Some("a.jpg"), callback);
    assert!(matches!(next_state(&mut rx).await, ImageState::Missing));

    let png = png_bytes(8, 8, 9);
    queue
        .submit(&NewRequest::save("a.jpg", png.clone(), None))
        .unwrap();
    queue.drain().await.unwrap();

    let state = next_state(&mut rx).await;
    assert_eq!(state.image().unwrap().bytes, png);
    assert_eq!(cache.waiting("a.jpg"), 0);
}

#[tokio::test]
async fn test_save_invalidates_stale_entries() {
    let (_, storage, queue) = memory_queue();
    let cache = ImageCache::new(storage.clone(), 4);
    queue.observe(Arc::new(cache.clone()));

    storage.write("a.jpg", &png_bytes(4, 4, 1)).unwrap();
    assert!(cache.load(Some("a.jpg")).await.unwrap().is_loaded());

    let replacement = png_bytes(6, 6, 2);
    queue
        .submit(&NewRequest::save("a.jpg", replacement.clone(), None))
        .unwrap();
    queue.drain().await.unwrap();

    assert!(cache.peek("a.jpg").is_none());
    let state = cache.load(Some("a.jpg")).await.unwrap();
    assert_eq!(state.image().unwrap().bytes, replacement);
}

#[tokio::test]
async fn test_delete_evicts_image_and_thumbnail() {
    let (_, storage, queue) = memory_queue();
    let cache = ImageCache::new(storage.clone(), 4);
    queue.observe(Arc::new(cache.clone()));
    let mut events = queue.subscribe();

    queue
        .submit(&NewRequest::save("a.jpg", png_bytes(40, 20, 1), None))
        .unwrap();
    queue.drain().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), QueueEvent::Applied { .. }));

    let thumb = cache.load_blocking(Some("thumb_a.jpg"));
    assert_eq!(thumb.image().unwrap().width(), 16);
    assert!(cache.load_blocking(Some("a.jpg")).is_loaded());

    queue.submit(&NewRequest::delete("a.jpg", None)).unwrap();
    queue.drain().await.unwrap();

    assert!(cache.peek("a.jpg").is_none());
    assert!(cache.peek("thumb_a.jpg").is_none());
    assert!(matches!(cache.load(Some("a.jpg")).await.unwrap(), ImageState::Missing));
}

#[tokio::test]
async fn test_thumbnail_is_fetched_independently() {
    let storage = Arc::new(MemoryStorage::new());
    storage.write("a.jpg", &png_bytes(4, 4, 1)).unwrap();
    let cache = ImageCache::new(storage, 4);
    let (callback, mut rx) = channel_callback();

    // Full image present, thumbnail not derived yet: no inline downscale.
    cache.fetch_thumbnail(Some("a.jpg"), callback);
    assert!(matches!(next_state(&mut rx).await, ImageState::Missing));
    assert!(cache.peek("a.jpg").is_none());
}

#[test]
fn test_capacity_bounds_memory_tier() {
    let storage = Arc::new(MemoryStorage::new());
    for i in 0..6 {
        storage
            .write(&format!("{i}.jpg"), &png_bytes(2, 2, i))
            .unwrap();
    }
    let cache = ImageCache::new(storage, 2);

    for i in 0..6 {
        assert!(cache.load_blocking(Some(&format!("{i}.jpg"))).is_loaded());
    }
    assert!(cache.len() <= 2);

    cache.invalidate("5.jpg");
    assert!(cache.peek("5.jpg").is_none());
}

#[test]
fn test_repeated_misses_do_not_pile_up_waiters() {
    let cache = ImageCache::new(Arc::new(MemoryStorage::new()), 4);

    // Outside a runtime the lookup settles inline.
    let callback = noop();
    for _ in 0..3 {
        let state = cache.fetch(Some("gone.jpg"), Arc::clone(&callback));
        assert!(matches!(state, ImageState::Missing));
    }
    assert_eq!(cache.waiting("gone.jpg"), 1);

    for _ in 0..1000 {
        cache.fetch(Some("gone.jpg"), noop());
    }
    assert_eq!(cache.waiting("gone.jpg"), MAX_WAITERS_PER_IMAGE);
}

#[test]
fn test_delete_ends_the_wait() {
    let cache = ImageCache::new(Arc::new(MemoryStorage::new()), 4);
    cache.fetch(Some("gone.jpg"), noop());
    cache.fetch_thumbnail(Some("gone.jpg"), noop());
    assert_eq!(cache.waiting("gone.jpg"), 1);
    assert_eq!(cache.waiting("thumb_gone.jpg"), 1);

    cache.artifact_applied(ArtifactCommand::Delete, "gone.jpg");
    assert_eq!(cache.waiting("gone.jpg"), 0);
    assert_eq!(cache.waiting("thumb_gone.jpg"), 0);
}

/// Each read removes the file, as if a delete were applied right after it.
struct VanishingStorage(MemoryStorage);

impl ArtifactStorage for VanishingStorage {
    fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        self.0.write(name, data)
    }

    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let bytes = self.0.read(name)?;
        self.0.delete(name)?;
        Ok(bytes)
    }

    fn delete(&self, name: &str) -> io::Result<bool> {
        self.0.delete(name)
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        self.0.exists(name)
    }

    fn list(&self) -> io::Result<Vec<String>> {
        self.0.list()
    }
}

#[test]
fn test_image_deleted_during_load_is_not_kept() {
    let storage = VanishingStorage(MemoryStorage::new());
    storage.write("a.jpg", &png_bytes(4, 4, 1)).unwrap();
    let cache = ImageCache::new(Arc::new(storage), 4);

    assert!(matches!(cache.load_blocking(Some("a.jpg")), ImageState::Missing));
    assert!(cache.peek("a.jpg").is_none());
}
