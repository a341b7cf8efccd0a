//! In-memory artifact storage.
//!
//! Non-persistent store for tests and dry runs. Supports injecting write and
//! delete failures so retry and dead-letter paths can be exercised without a
//! real flaky disk.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ArtifactStorage;
use super::validation::validate_name;

/// In-memory artifact storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Failures handed out to the next writes, one per call.
    queued_faults: Mutex<VecDeque<io::ErrorKind>>,
    /// Failure returned by every write while set.
    sticky_fault: Mutex<Option<io::ErrorKind>>,
    /// Failure returned by every delete while set.
    delete_fault: Mutex<Option<io::ErrorKind>>,
    write_calls: AtomicUsize,
}

impl MemoryStorage {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes with `kind`.
    pub fn fail_next_writes(&self, count: usize, kind: io::ErrorKind) {
        let mut faults = self.queued_faults.lock();
        faults.extend(std::iter::repeat_n(kind, count));
    }

    /// Fail every write with `kind` until [`clear_faults`](Self::clear_faults).
    pub fn fail_all_writes(&self, kind: io::ErrorKind) {
        *self.sticky_fault.lock() = Some(kind);
    }

    /// Fail every delete with `kind` until [`clear_faults`](Self::clear_faults).
    pub fn fail_all_deletes(&self, kind: io::ErrorKind) {
        *self.delete_fault.lock() = Some(kind);
    }

    /// Stop injecting failures.
    pub fn clear_faults(&self) {
        self.queued_faults.lock().clear();
        *self.sticky_fault.lock() = None;
        *self.delete_fault.lock() = None;
    }

    /// Number of `write` calls so far, including failed ones.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of artifacts in the store.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    fn take_fault(&self) -> Option<io::ErrorKind> {
        if let Some(kind) = *self.sticky_fault.lock() {
            return Some(kind);
        }
        self.queued_faults.lock().pop_front()
    }
}

impl ArtifactStorage for MemoryStorage {
    fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        validate_name(name)?;
        if let Some(kind) = self.take_fault() {
            return Err(io::Error::new(kind, "injected write failure"));
        }
        self.data.lock().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        validate_name(name)?;
        Ok(self.data.lock().get(name).cloned())
    }

    fn delete(&self, name: &str) -> io::Result<bool> {
        validate_name(name)?;
        if let Some(kind) = *self.delete_fault.lock() {
            return Err(io::Error::new(kind, "injected delete failure"));
        }
        Ok(self.data.lock().remove(name).is_some())
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        validate_name(name)?;
        Ok(self.data.lock().contains_key(name))
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.data.lock().keys().cloned().collect())
    }
}
