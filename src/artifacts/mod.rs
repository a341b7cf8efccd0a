//! Image artifact queue.
//!
//! Sequences the filesystem side effects of pin edits (saving an image and
//! deriving its thumbnail, deleting both) through a durable SQLite table so
//! that what the pins reference never drifts from what is on disk, even if
//! the process dies mid-operation.
//!
//! # Lifecycle of a request
//!
//! ```text
//! enqueue (in pin tx) -> pending -> applying -> removed
//!                                      |
//!                                      +-> dead (permanent / out of retries)
//! ```
//!
//! "Applying" is never written down: a crash leaves the row `pending`, and
//! both commands are idempotent, so replaying it is always safe.

mod persistence;
mod queue;
pub mod storage;
pub mod thumbnail;
mod types;


pub use queue::{ArtifactObserver, ArtifactQueue};
pub use storage::{ArtifactStorage, FilesystemStorage, MemoryStorage};
pub use thumbnail::ThumbnailSpec;
pub use types::{
    ArtifactCommand, ArtifactRequest, DrainReport, NewRequest, QueueEvent, QueueSettings,
    RequestStatus,
};

use crate::constants::THUMBNAIL_PREFIX;

/// Name of the thumbnail derived from `filename`.
///
/// ```
/// assert_eq!(pinboard::artifacts::thumbnail_name("a.jpg"), "thumb_a.jpg");
/// ```
#[must_use]
pub fn thumbnail_name(filename: &str) -> String {
    format!("{THUMBNAIL_PREFIX}{filename}")
}
