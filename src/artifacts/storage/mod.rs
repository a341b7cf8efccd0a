//! Artifact storage backends.
//!
//! A flat, filename-addressed byte store. Each call is individually atomic
//! from the queue's point of view: a `write` either fully replaces the
//! artifact or leaves the previous state untouched.
//!
//! - [`FilesystemStorage`] - durable files under a base directory
//! - [`MemoryStorage`] - in-process map with fault injection (tests)

mod filesystem;
mod memory;
mod validation;

use std::io;

pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;
pub use validation::validate_name;

/// Backend trait for artifact storage.
///
/// All backends must be thread-safe (`Send + Sync`). Methods are blocking;
/// async callers wrap them in `spawn_blocking`.
///
/// Names that fail [`validate_name`] are rejected with
/// [`io::ErrorKind::InvalidInput`].
pub trait ArtifactStorage: Send + Sync + 'static {
    /// Create or replace `name`. Durable once this returns `Ok`.
    fn write(&self, name: &str, data: &[u8]) -> io::Result<()>;

    /// Read `name`, or `None` if it does not exist.
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Remove `name`. Returns `Ok(false)` if it did not exist.
    fn delete(&self, name: &str) -> io::Result<bool>;

    /// Whether `name` exists.
    fn exists(&self, name: &str) -> io::Result<bool>;

    /// All artifact names, sorted.
    fn list(&self) -> io::Result<Vec<String>>;
}
