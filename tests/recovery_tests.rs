//! Crash recovery and failure handling tests.
//!
//! "Crashing" means dropping every handle with requests still pending (and
//! sometimes with an operation half applied), then opening the same data
//! directory again.

#[path = "common.rs"]
mod common;

use common::{TestHome, png, request_rows};
use pinboard::PinDraft;
use pinboard::artifacts::{
    ArtifactCommand, ArtifactStorage, MemoryStorage, NewRequest, QueueEvent, thumbnail_name,
};
use std::io;
use std::sync::Arc;

// =============================================================================
// Crash Recovery
// =============================================================================

#[tokio::test]
async fn test_crash_mid_save_is_replayed_on_open() {
    let home = TestHome::new();
    let bytes = png(40, 30, 5);

    let (pin, name) = {
        let offline = home.offline();
        let pin = offline
            .pins
            .create(PinDraft::new(12.0, 34.0).with_image(bytes.clone()))
            .unwrap();
        let name = pin.image_name.clone().unwrap();

        // Died after writing the full-size file, before the thumbnail.
        offline.storage.write(&name, &bytes).unwrap();
        assert_eq!(request_rows(&offline.db), 1);
        (pin, name)
    };

    let board = home.open().await;
    let storage = home.storage();
    assert_eq!(storage.read(&name).unwrap().unwrap(), bytes);
    assert!(storage.exists(&thumbnail_name(&name)).unwrap());
    assert_eq!(request_rows(board.database()), 0);
    assert_eq!(board.pins().get(&pin.id).unwrap().unwrap(), pin);
    assert!(board.audit().unwrap().is_empty());
    board.shutdown().await;
}

#[tokio::test]
async fn test_repeated_crashes_do_not_duplicate_requests() {
    let home = TestHome::new();
    {
        let offline = home.offline();
        let pin = offline
            .pins
            .create(PinDraft::new(0.0, 0.0).with_image(png(8, 8, 1)))
            .unwrap();
        offline.pins.delete(&pin.id).unwrap();
        assert_eq!(request_rows(&offline.db), 2);
    }
    {
        // Reopened but died again before draining.
        let offline = home.offline();
        assert_eq!(request_rows(&offline.db), 2);
    }

    let board = home.open().await;
    assert_eq!(request_rows(board.database()), 0);
    assert!(home.storage().list().unwrap().is_empty());
    board.shutdown().await;
}

#[tokio::test]
async fn test_recovery_preserves_fifo_for_same_filename() {
    let home = TestHome::new();
    {
        let offline = home.offline();
        offline.storage.write("shared.jpg", b"stale").unwrap();
        offline
            .queue
            .submit(&NewRequest::delete("shared.jpg", None))
            .unwrap();
        offline
            .queue
            .submit(&NewRequest::save("shared.jpg", png(6, 6, 7), None))
            .unwrap();
    }

    let board = home.open().await;
    let storage = home.storage();
    assert!(storage.exists("shared.jpg").unwrap());
    assert!(storage.exists("thumb_shared.jpg").unwrap());
    assert_ne!(storage.read("shared.jpg").unwrap().unwrap(), b"stale");
    board.shutdown().await;
}

#[tokio::test]
async fn test_pending_requests_survive_shutdown() {
    let home = TestHome::new();
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_all_writes(io::ErrorKind::Other);

    let board = home.open_with_storage(storage.clone()).await;
    board.shutdown().await;
    // Worker stopped: this stays pending.
    board
        .pins()
        .create(PinDraft::new(0.0, 0.0).with_image(png(4, 4, 4)))
        .unwrap();
    assert_eq!(board.queue().pending().unwrap().len(), 1);
    assert!(board.audit().unwrap().is_empty());
    drop(board);

    storage.clear_faults();
    let board = home.open_with_storage(storage.clone()).await;
    assert!(board.queue().pending().unwrap().is_empty());
    assert_eq!(storage.len(), 2);
    board.shutdown().await;
}

// =============================================================================
// Retry and Dead Letters
// =============================================================================

#[tokio::test]
async fn test_transient_failure_is_retried_and_succeeds() {
    let home = TestHome::new();
    let storage = Arc::new(MemoryStorage::new());
    let board = home.open_with_storage(storage.clone()).await;
    board.shutdown().await;

    storage.fail_next_writes(2, io::ErrorKind::Other);
    let pin = board
        .pins()
        .create(PinDraft::new(0.0, 0.0).with_image(png(4, 4, 4)))
        .unwrap();
    let report = board.queue().drain().await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.dead_lettered, 0);
    assert!(storage.exists(pin.image_name.as_deref().unwrap()).unwrap());
    assert!(board.pins().image_failures().unwrap().is_empty());
}

#[tokio::test]
async fn test_persistent_failure_is_dead_lettered_with_pin_id() {
    let home = TestHome::new();
    let storage = Arc::new(MemoryStorage::new());
    let board = home.open_with_storage(storage.clone()).await;
    board.shutdown().await;
    let mut events = board.queue().subscribe();

    storage.fail_all_writes(io::ErrorKind::Other);
    let pin = board
        .pins()
        .create(PinDraft::new(0.0, 0.0).with_image(png(4, 4, 4)))
        .unwrap();
    let name = pin.image_name.clone().unwrap();
    board.queue().drain().await.unwrap();

    match events.recv().await.unwrap() {
        QueueEvent::DeadLettered {
            command,
            filename,
            pin_id,
            ..
        } => {
            assert_eq!(command, ArtifactCommand::Save);
            assert_eq!(filename, name);
            assert_eq!(pin_id.as_deref(), Some(pin.id.as_str()));
        },
        other => panic!("unexpected event {other:?}"),
    }

    let failures = board.pins().image_failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].pin_id, pin.id);
    assert!(failures[0].still_referenced);
    // A dead-lettered save is accounted for, not a silent violation.
    assert!(board.audit().unwrap().is_empty());

    // Fix the disk and retry.
    storage.clear_faults();
    assert!(board.queue().retry_dead_letter(failures[0].sequence).unwrap());
    board.queue().drain().await.unwrap();
    assert!(storage.exists(&name).unwrap());
    assert!(board.pins().image_failures().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_save_cannot_resurrect_image_of_deleted_pin() {
    let home = TestHome::new();
    let storage = Arc::new(MemoryStorage::new());
    let board = home.open_with_storage(storage.clone()).await;
    board.shutdown().await;

    storage.fail_all_writes(io::ErrorKind::Other);
    let pin = board
        .pins()
        .create(PinDraft::new(0.0, 0.0).with_image(png(4, 4, 4)))
        .unwrap();
    board.queue().drain().await.unwrap();
    let stale = board.pins().image_failures().unwrap()[0].sequence;

    storage.clear_faults();
    board.pins().delete(&pin.id).unwrap();
    board.queue().drain().await.unwrap();
    assert!(board.pins().image_failures().unwrap().is_empty());

    assert!(!board.queue().retry_dead_letter(stale).unwrap());
    board.queue().drain().await.unwrap();
    assert!(storage.is_empty());
    assert_eq!(request_rows(board.database()), 0);
    assert!(board.audit().unwrap().is_empty());
}

#[tokio::test]
async fn test_audit_reports_unaccounted_images() {
    let home = TestHome::new();
    let board = home.open().await;
    let pin = board
        .pins()
        .create(PinDraft::new(0.0, 0.0).with_image(png(4, 4, 4)))
        .unwrap();
    board.queue().drain().await.unwrap();
    let name = pin.image_name.unwrap();

    // Someone removed the file behind our back.
    home.storage().delete(&name).unwrap();

    let violations = board.audit().unwrap();
    assert_eq!(violations.len(), 1);
    assert!(violations[0].to_string().contains(&name));
    // Reported, not repaired.
    assert!(!home.storage().exists(&name).unwrap());
    assert!(board.queue().pending().unwrap().is_empty());
    board.shutdown().await;
}

#[tokio::test]
async fn test_audit_reports_unreferenced_files() {
    let home = TestHome::new();
    let board = home.open().await;
    let pin = board
        .pins()
        .create(PinDraft::new(0.0, 0.0).with_image(png(4, 4, 4)))
        .unwrap();
    board.queue().drain().await.unwrap();

    let storage = home.storage();
    storage.write("stray.jpg", &png(4, 4, 9)).unwrap();

    let violations = board.audit().unwrap();
    assert_eq!(violations.len(), 1);
    assert!(violations[0].to_string().contains("stray.jpg"));
    // The pin's own image and thumbnail are fine.
    assert!(storage.exists(pin.image_name.as_deref().unwrap()).unwrap());
    board.shutdown().await;
}
