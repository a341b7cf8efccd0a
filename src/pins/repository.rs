//! SQLite-backed pin repository.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{ImageChange, ImageFailure, Pin, PinDraft};
use crate::artifacts::{ArtifactQueue, NewRequest};
use crate::bus::{Event, NotificationBus};
use crate::colors::is_valid_color_id;
use crate::constants::{IMAGE_EXTENSION, PIN_COLOR_COUNT};
use crate::error::{Error, Result};
use crate::store::Database;

const PIN_COLUMNS: &str =
    "id, name, details, latitude, longitude, altitude, color_id, image_name, last_modified";

/// CRUD over pins.
///
/// Image changes are never applied here: they are enqueued on the artifact
/// queue in the same transaction as the pin row, then the worker is woken
/// once the transaction has committed.
#[derive(Clone)]
pub struct PinRepository {
    db: Database,
    queue: ArtifactQueue,
    bus: Arc<NotificationBus>,
}

impl PinRepository {
    pub fn new(db: Database, queue: ArtifactQueue, bus: Arc<NotificationBus>) -> Self {
        Self { db, queue, bus }
    }

    /// Create a pin with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for out-of-range coordinates or color,
    /// or empty replacement image bytes. Nothing is persisted in that case.
    pub fn create(&self, draft: PinDraft) -> Result<Pin> {
        validate(&draft)?;

        let id = Uuid::new_v4().to_string();
        let pin = self.db.transaction(|tx| {
            let image_name = match draft.image {
                ImageChange::Replace(ref bytes) => {
                    let name = new_image_name();
                    ArtifactQueue::enqueue(tx, &NewRequest::save(&name, bytes.clone(), Some(&id)))?;
                    Some(name)
                },
                ImageChange::Keep | ImageChange::Remove => None,
            };

            let pin = build(id.clone(), &draft, image_name);
            insert(tx, &pin)?;
            Ok::<_, Error>(pin)
        })?;

        info!(pin_id = %pin.id, image = pin.image_name.as_deref(), "Created pin");
        self.committed();
        Ok(pin)
    }

    /// Overwrite a pin's fields. Last write wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id, or
    /// [`Error::Validation`] as for [`create`](Self::create).
    pub fn update(&self, id: &str, draft: PinDraft) -> Result<Pin> {
        validate(&draft)?;
        self.edit(id, move |_| draft)
    }

    /// Replace a pin's image, keeping every other field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id, or
    /// [`Error::Validation`] if `bytes` is empty.
    pub fn attach_image(&self, id: &str, bytes: Vec<u8>) -> Result<Pin> {
        if bytes.is_empty() {
            return Err(Error::validation("image bytes cannot be empty"));
        }
        self.edit(id, move |current| PinDraft::from_pin(current).with_image(bytes))
    }

    /// Remove a pin's image, keeping every other field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn detach_image(&self, id: &str) -> Result<Pin> {
        self.edit(id, |current| PinDraft::from_pin(current).without_image())
    }

    fn edit(&self, id: &str, draft_for: impl FnOnce(&Pin) -> PinDraft) -> Result<Pin> {
        let pin = self.db.transaction(|tx| {
            let current = select(tx, id)?.ok_or_else(|| Error::not_found(id))?;
            let draft = draft_for(&current);
            let previous = current.image_name.clone();

            let image_name = match draft.image {
                ImageChange::Keep => previous.clone(),
                ImageChange::Replace(ref bytes) => {
                    let name = new_image_name();
                    ArtifactQueue::enqueue(tx, &NewRequest::save(&name, bytes.clone(), Some(id)))?;
                    Some(name)
                },
                ImageChange::Remove => None,
            };
            if let Some(old) = previous.as_deref()
                && image_name.as_deref() != Some(old)
            {
                ArtifactQueue::enqueue(tx, &NewRequest::delete(old, Some(id)))?;
            }

            let pin = build(current.id, &draft, image_name);
            tx.execute(
                "UPDATE pins SET name = ?2, details = ?3, latitude = ?4, longitude = ?5,
                     altitude = ?6, color_id = ?7, image_name = ?8, last_modified = ?9
                 WHERE id = ?1",
                params![
                    pin.id,
                    pin.name,
                    pin.details,
                    pin.latitude,
                    pin.longitude,
                    pin.altitude,
                    pin.color_id,
                    pin.image_name,
                    pin.last_modified,
                ],
            )?;
            Ok::<_, Error>(pin)
        })?;

        info!(pin_id = %pin.id, image = pin.image_name.as_deref(), "Updated pin");
        self.committed();
        Ok(pin)
    }

    /// Delete a pin and enqueue removal of its image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.db.transaction(|tx| {
            let image_name: Option<String> = tx
                .query_row("SELECT image_name FROM pins WHERE id = ?1", params![id], |r| {
                    r.get(0)
                })
                .optional()?
                .ok_or_else(|| Error::not_found(id))?;

            if let Some(name) = image_name.as_deref() {
                ArtifactQueue::enqueue(tx, &NewRequest::delete(name, Some(id)))?;
            }
            tx.execute("DELETE FROM pins WHERE id = ?1", params![id])?;
            Ok::<_, Error>(())
        })?;

        info!(pin_id = id, "Deleted pin");
        self.committed();
        Ok(())
    }

    /// All pins, most recently modified first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self) -> Result<Vec<Pin>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PIN_COLUMNS} FROM pins ORDER BY last_modified DESC, id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_pin)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(Error::from)
        })
    }

    /// Look up a pin.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<Pin>> {
        self.db.with_conn(|conn| select(conn, id).map_err(Error::from))
    }

    /// Dead-lettered image saves and deletes that came from pin edits.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn image_failures(&self) -> Result<Vec<ImageFailure>> {
        let dead = self.queue.dead_letters()?;
        self.db.with_conn(|conn| {
            let mut failures = Vec::new();
            for request in dead {
                let Some(pin_id) = request.pin_id else {
                    continue;
                };
                let still_referenced: bool = conn.query_row(
                    "SELECT EXISTS (SELECT 1 FROM pins WHERE id = ?1 AND image_name = ?2)",
                    params![pin_id, request.filename],
                    |r| r.get(0),
                )?;
                failures.push(ImageFailure {
                    sequence: request.sequence,
                    command: request.command,
                    pin_id,
                    filename: request.filename,
                    reason: request.last_error,
                    attempts: request.attempts,
                    still_referenced,
                });
            }
            Ok(failures)
        })
    }

    fn committed(&self) {
        self.queue.wake();
        self.bus.publish(Event::PinsChanged);
    }
}

impl std::fmt::Debug for PinRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinRepository")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

fn validate(draft: &PinDraft) -> Result<()> {
    if !draft.latitude.is_finite() || !(-90.0..=90.0).contains(&draft.latitude) {
        return Err(Error::validation(format!(
            "latitude {} is outside [-90, 90]",
            draft.latitude
        )));
    }
    if !draft.longitude.is_finite() || !(-180.0..=180.0).contains(&draft.longitude) {
        return Err(Error::validation(format!(
            "longitude {} is outside [-180, 180]",
            draft.longitude
        )));
    }
    if !draft.altitude.is_finite() {
        return Err(Error::validation("altitude must be a finite number"));
    }
    if !is_valid_color_id(i64::from(draft.color_id)) {
        return Err(Error::validation(format!(
            "color id {} is out of range (0-{})",
            draft.color_id,
            PIN_COLOR_COUNT - 1
        )));
    }
    if matches!(&draft.image, ImageChange::Replace(bytes) if bytes.is_empty()) {
        return Err(Error::validation("image bytes cannot be empty"));
    }
    Ok(())
}

fn new_image_name() -> String {
    format!("{}.{IMAGE_EXTENSION}", Uuid::new_v4())
}

fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn build(id: String, draft: &PinDraft, image_name: Option<String>) -> Pin {
    Pin {
        id,
        name: clean_text(draft.name.as_deref()),
        details: clean_text(draft.details.as_deref()),
        latitude: draft.latitude,
        longitude: draft.longitude,
        altitude: draft.altitude,
        color_id: draft.color_id,
        image_name,
        last_modified: Utc::now(),
    }
}

fn insert(conn: &Connection, pin: &Pin) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO pins ({PIN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            pin.id,
            pin.name,
            pin.details,
            pin.latitude,
            pin.longitude,
            pin.altitude,
            pin.color_id,
            pin.image_name,
            pin.last_modified,
        ],
    )?;
    debug!(pin_id = %pin.id, "Inserted pin row");
    Ok(())
}

fn select(conn: &Connection, id: &str) -> rusqlite::Result<Option<Pin>> {
    conn.query_row(
        &format!("SELECT {PIN_COLUMNS} FROM pins WHERE id = ?1"),
        params![id],
        row_to_pin,
    )
    .optional()
}

fn row_to_pin(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pin> {
    Ok(Pin {
        id: row.get(0)?,
        name: row.get(1)?,
        details: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        altitude: row.get(5)?,
        color_id: row.get(6)?,
        image_name: row.get(7)?,
        last_modified: row.get(8)?,
    })
}
