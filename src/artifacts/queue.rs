//! The durable artifact queue and its worker.

use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::persistence;
use super::storage::{ArtifactStorage, validate_name};
use super::thumbnail::{self, ThumbnailSpec};
use super::thumbnail_name;
use super::types::{
    ArtifactCommand, ArtifactRequest, DrainReport, NewRequest, QueueEvent, QueueSettings,
    RequestStatus,
};
use crate::constants::{EVENT_CHANNEL_CAPACITY, THUMBNAIL_PREFIX};
use crate::error::{Error, Result};
use crate::reliability::retry_async;
use crate::store::Database;

/// Told about every request whose filesystem effect became durable.
///
/// Called on the draining task, after the request row is removed and before
/// [`QueueEvent::Applied`] is broadcast. Implementations must not block.
pub trait ArtifactObserver: Send + Sync {
    fn artifact_applied(&self, command: ArtifactCommand, filename: &str);
}

struct QueueInner {
    db: Database,
    storage: Arc<dyn ArtifactStorage>,
    settings: QueueSettings,
    /// Held for the whole of a drain pass: one active drainer at a time.
    drain_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    shutdown: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    observers: RwLock<Vec<Arc<dyn ArtifactObserver>>>,
    events: broadcast::Sender<QueueEvent>,
}

/// Durable, strictly ordered log of image file operations.
///
/// Requests are inserted inside the caller's SQLite transaction and applied
/// in `sequence` order. A row is removed only once its effect on storage is
/// durable, so after a crash [`drain`](Self::drain) simply replays whatever
/// is still pending.
#[derive(Clone)]
pub struct ArtifactQueue {
    inner: Arc<QueueInner>,
}

impl ArtifactQueue {
    pub fn new(db: Database, storage: Arc<dyn ArtifactStorage>, settings: QueueSettings) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                db,
                storage,
                settings,
                drain_lock: tokio::sync::Mutex::new(()),
                wake: Notify::new(),
                shutdown: AtomicBool::new(false),
                worker: Mutex::new(None),
                observers: RwLock::new(Vec::new()),
                events: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            }),
        }
    }

    /// Append `request` using the caller's connection or transaction.
    ///
    /// Nothing is applied until the transaction commits and the queue is
    /// [woken](Self::wake).
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the filename is not a valid artifact name or
    /// uses the reserved thumbnail prefix, or if a save has no payload.
    pub fn enqueue(conn: &Connection, request: &NewRequest) -> Result<i64> {
        validate_name(&request.filename).map_err(|e| Error::validation(e.to_string()))?;
        if request.filename.starts_with(THUMBNAIL_PREFIX) {
            return Err(Error::validation(format!(
                "artifact name '{}' uses the reserved prefix '{THUMBNAIL_PREFIX}'",
                request.filename
            )));
        }
        if request.command == ArtifactCommand::Save
            && request.payload.as_deref().is_none_or(<[u8]>::is_empty)
        {
            return Err(Error::validation(format!(
                "save request for '{}' has no image bytes",
                request.filename
            )));
        }

        // Whatever comes next for this name makes an earlier failed save moot.
        let superseded = persistence::discard_dead_saves(conn, &request.filename)?;
        if superseded > 0 {
            info!(
                filename = %request.filename,
                superseded,
                "Dropped dead-lettered saves superseded by a new request"
            );
        }

        let sequence = persistence::insert(conn, request)?;
        debug!(
            sequence,
            command = %request.command,
            filename = %request.filename,
            "Enqueued artifact request"
        );
        Ok(sequence)
    }

    /// Append `request` in its own transaction and wake the worker.
    ///
    /// # Errors
    ///
    /// See [`enqueue`](Self::enqueue).
    pub fn submit(&self, request: &NewRequest) -> Result<i64> {
        let sequence = self
            .inner
            .db
            .transaction(|tx| Self::enqueue(tx, request))?;
        self.wake();
        Ok(sequence)
    }

    /// Nudge the worker. Wake-ups are never lost: one that arrives while
    /// the worker is busy is kept until it next waits.
    pub fn wake(&self) {
        self.inner.wake.notify_one();
    }

    /// Register an observer for applied requests.
    pub fn observe(&self, observer: Arc<dyn ArtifactObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Receive [`QueueEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Storage backend the queue writes to.
    pub fn storage(&self) -> &Arc<dyn ArtifactStorage> {
        &self.inner.storage
    }

    /// Apply pending requests until none are left.
    ///
    /// Transient failures are retried with backoff; a request that fails
    /// permanently or runs out of retries is dead-lettered and the drain
    /// moves on. Waits for any drain already in progress (including the
    /// worker's) to finish first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the queue table itself cannot be read or
    /// updated.
    pub async fn drain(&self) -> Result<DrainReport> {
        self.drain_pass(false).await
    }

    /// With `interruptible`, stops between requests once shutdown is
    /// requested, leaving the rest pending.
    async fn drain_pass(&self, interruptible: bool) -> Result<DrainReport> {
        let _guard = self.inner.drain_lock.lock().await;
        let mut report = DrainReport::default();

        while !(interruptible && self.inner.shutdown.load(Ordering::SeqCst)) {
            let next = self
                .inner
                .db
                .blocking(|db| Ok(db.with_conn(persistence::next_pending)?))
                .await?;
            let Some(request) = next else {
                break;
            };

            let request = Arc::new(request);
            let (result, attempts) = self.apply_with_retry(&request).await;
            match result {
                Ok(()) => {
                    self.settle(&request).await?;
                    report.applied += 1;
                },
                Err(err) => {
                    self.dead_letter(&request, attempts, &err).await?;
                    report.dead_lettered += 1;
                },
            }
        }

        if report.total() > 0 {
            info!(
                applied = report.applied,
                dead_lettered = report.dead_lettered,
                "Artifact queue drained"
            );
        }
        Ok(report)
    }

    async fn apply_with_retry(&self, request: &Arc<ArtifactRequest>) -> (Result<()>, u32) {
        let mut attempts = 0u32;
        let result = retry_async(
            &self.inner.settings.retry,
            "apply artifact request",
            || {
                attempts += 1;
                let storage = Arc::clone(&self.inner.storage);
                let request = Arc::clone(request);
                let spec = self.inner.settings.thumbnail;
                async move {
                    tokio::task::spawn_blocking(move || apply(storage.as_ref(), &request, spec))
                        .await
                        .unwrap_or_else(|e| Err(Error::from(e)))
                }
            },
            Error::is_transient,
        )
        .await;
        (result, attempts)
    }

    async fn settle(&self, request: &ArtifactRequest) -> Result<()> {
        let sequence = request.sequence;
        self.inner
            .db
            .blocking(move |db| Ok(db.with_conn(|conn| persistence::remove(conn, sequence))?))
            .await?;

        let observers = self.inner.observers.read().clone();
        for observer in &observers {
            observer.artifact_applied(request.command, &request.filename);
        }

        debug!(
            sequence,
            command = %request.command,
            filename = %request.filename,
            "Applied artifact request"
        );
        let _ = self.inner.events.send(QueueEvent::Applied {
            sequence,
            command: request.command,
            filename: request.filename.clone(),
        });
        Ok(())
    }

    async fn dead_letter(
        &self,
        request: &ArtifactRequest,
        attempts: u32,
        err: &Error,
    ) -> Result<()> {
        let sequence = request.sequence;
        let reason = err.to_string();
        let stored_reason = reason.clone();
        self.inner
            .db
            .blocking(move |db| {
                Ok(db.with_conn(|conn| {
                    persistence::mark_dead(conn, sequence, attempts, &stored_reason)
                })?)
            })
            .await?;

        error!(
            sequence,
            command = %request.command,
            filename = %request.filename,
            pin_id = request.pin_id.as_deref().unwrap_or("-"),
            attempts,
            error = %reason,
            "Artifact request dead-lettered"
        );
        let _ = self.inner.events.send(QueueEvent::DeadLettered {
            sequence,
            command: request.command,
            filename: request.filename.clone(),
            pin_id: request.pin_id.clone(),
            reason,
        });
        Ok(())
    }

    /// Spawn the background worker on the current Tokio runtime.
    ///
    /// The worker drains once immediately, then again on every
    /// [`wake`](Self::wake). Returns false if a worker is already running,
    /// the queue was shut down, or no runtime is available.
    pub fn start(&self) -> bool {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let mut worker = self.inner.worker.lock();
        if worker.is_some() {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No Tokio runtime; artifact queue worker not started");
            return false;
        };

        let queue = self.clone();
        *worker = Some(handle.spawn(async move { queue.run().await }));
        true
    }

    async fn run(self) {
        info!("Artifact queue worker started");
        loop {
            if let Err(e) = self.drain_pass(true).await {
                error!(error = %e, "Artifact queue drain failed");
            }
            if self.inner.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.inner.wake.notified().await;
            if self.inner.shutdown.load(Ordering::SeqCst) {
                break;
            }
        }
        info!("Artifact queue worker stopped");
    }

    /// Stop the worker once it finishes the request it is applying.
    ///
    /// Pending requests stay in the table and are replayed on next start.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();

        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Artifact queue worker ended abnormally");
        }
    }

    /// Requests waiting to be applied, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read.
    pub fn pending(&self) -> Result<Vec<ArtifactRequest>> {
        Ok(self
            .inner
            .db
            .with_conn(|conn| persistence::list(conn, RequestStatus::Pending))?)
    }

    /// Requests that failed permanently, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read.
    pub fn dead_letters(&self) -> Result<Vec<ArtifactRequest>> {
        Ok(self
            .inner
            .db
            .with_conn(|conn| persistence::list(conn, RequestStatus::Dead))?)
    }

    /// Put a dead-lettered request back in line and wake the worker.
    ///
    /// It keeps its original sequence. Returns false if no dead request has
    /// that sequence.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a later request for the same filename exists,
    /// since replaying this one would undo it. Such a request can only be
    /// discarded. Otherwise errors only if the queue table cannot be updated.
    pub fn retry_dead_letter(&self, sequence: i64) -> Result<bool> {
        let revived = self.inner.db.transaction(|tx| {
            if persistence::superseded(tx, sequence)? {
                return Err(Error::validation(format!(
                    "request #{sequence} was superseded by a later request for the same image; \
                     discard it instead"
                )));
            }
            Ok(persistence::revive(tx, sequence)?)
        })?;
        if revived {
            info!(sequence, "Dead-lettered artifact request requeued");
            self.wake();
        }
        Ok(revived)
    }

    /// Drop a dead-lettered request. Returns false if none matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be updated.
    pub fn discard_dead_letter(&self, sequence: i64) -> Result<bool> {
        let discarded = self
            .inner
            .db
            .with_conn(|conn| persistence::discard(conn, sequence))?;
        if discarded {
            info!(sequence, "Dead-lettered artifact request discarded");
        }
        Ok(discarded)
    }

    /// Whether a save for `filename` is still waiting to be applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read.
    pub fn has_pending_save(&self, filename: &str) -> Result<bool> {
        self.has_request(filename, ArtifactCommand::Save, RequestStatus::Pending)
    }

    /// Whether a save for `filename` was dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read.
    pub fn has_dead_save(&self, filename: &str) -> Result<bool> {
        self.has_request(filename, ArtifactCommand::Save, RequestStatus::Dead)
    }

    fn has_request(
        &self,
        filename: &str,
        command: ArtifactCommand,
        status: RequestStatus,
    ) -> Result<bool> {
        Ok(self
            .inner
            .db
            .with_conn(|conn| persistence::exists(conn, filename, command, status))?)
    }

    /// Most recent request for `filename`, pending or dead.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue table cannot be read.
    pub fn latest_request(&self, filename: &str) -> Result<Option<ArtifactRequest>> {
        Ok(self
            .inner
            .db
            .with_conn(|conn| persistence::latest_for(conn, filename))?)
    }
}

impl std::fmt::Debug for ArtifactQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactQueue")
            .field("db", &self.inner.db)
            .field("settings", &self.inner.settings)
            .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Perform one request against storage. Both operations are idempotent.
fn apply(
    storage: &dyn ArtifactStorage,
    request: &ArtifactRequest,
    spec: ThumbnailSpec,
) -> Result<()> {
    let filename = request.filename.as_str();
    let thumb = thumbnail_name(filename);

    match request.command {
        ArtifactCommand::Save => {
            let payload = request
                .payload
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| Error::permanent(filename, "save request has no payload"))?;
            let image = thumbnail::decode(payload)
                .map_err(|e| Error::permanent(filename, format!("undecodable image: {e}")))?;
            let thumb_bytes = thumbnail::render(&image, spec)
                .map_err(|e| Error::permanent(&thumb, format!("thumbnail encoding failed: {e}")))?;

            storage
                .write(filename, payload)
                .map_err(|e| Error::storage(filename, e))?;
            storage
                .write(&thumb, &thumb_bytes)
                .map_err(|e| Error::storage(&thumb, e))?;
        },
        ArtifactCommand::Delete => {
            storage
                .delete(filename)
                .map_err(|e| Error::storage(filename, e))?;
            storage
                .delete(&thumb)
                .map_err(|e| Error::storage(&thumb, e))?;
        },
    }
    Ok(())
}
