//! Color mapping table.
//!
//! Fourteen built-in pin colors, each with a fixed name and a user-editable
//! descriptor. Rows are seeded once on an empty table and afterwards only
//! ever renamed.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bus::{Event, NotificationBus};
use crate::constants::PIN_COLOR_COUNT;
use crate::error::{Error, Result};
use crate::store::Database;

/// Built-in palette: `(name, rgb hex)` indexed by color id.
pub const PALETTE: [(&str, &str); PIN_COLOR_COUNT as usize] = [
    ("Red", "#FF3B30"),
    ("Orange", "#FF9500"),
    ("Yellow", "#FFCC00"),
    ("Green", "#34C759"),
    ("Mint", "#00C7BE"),
    ("Teal", "#30B0C7"),
    ("Cyan", "#32ADE6"),
    ("Blue", "#007AFF"),
    ("Indigo", "#5856D6"),
    ("Purple", "#AF52DE"),
    ("Pink", "#FF2D55"),
    ("Brown", "#A2845E"),
    ("Gray", "#8E8E93"),
    ("Black", "#1C1C1E"),
];

/// A row of the color mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinColor {
    pub color_id: u8,
    /// Fixed built-in label.
    pub name: String,
    /// User nickname.
    pub descriptor: String,
}

impl PinColor {
    /// RGB hex string from the built-in palette.
    #[must_use]
    pub fn hex(&self) -> &'static str {
        PALETTE[usize::from(self.color_id)].1
    }
}

/// Whether `color_id` names a built-in color.
#[must_use]
pub fn is_valid_color_id(color_id: i64) -> bool {
    (0..i64::from(PIN_COLOR_COUNT)).contains(&color_id)
}

/// Reads and renames pin colors.
#[derive(Clone)]
pub struct ColorTable {
    db: Database,
    bus: Arc<NotificationBus>,
}

impl ColorTable {
    pub fn new(db: Database, bus: Arc<NotificationBus>) -> Self {
        Self { db, bus }
    }

    /// Seed the built-in colors if the table is empty.
    ///
    /// Returns the number of rows inserted (0 when already seeded).
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn bootstrap_if_empty(&self) -> Result<usize> {
        let inserted = self.db.transaction(|tx| {
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM pin_colors", [], |r| r.get(0))?;
            if count > 0 {
                return Ok::<_, Error>(0);
            }

            let mut stmt = tx.prepare(
                "INSERT INTO pin_colors (color_id, name, descriptor) VALUES (?1, ?2, ?2)",
            )?;
            for (id, (name, _)) in PALETTE.iter().enumerate() {
                stmt.execute(params![id as i64, name])?;
            }
            Ok(PALETTE.len())
        })?;

        if inserted > 0 {
            info!(colors = inserted, "Seeded color table");
        } else {
            debug!("Color table already seeded");
        }
        Ok(inserted)
    }

    /// Change the descriptor of a color.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the id is out of range or the
    /// descriptor is blank; the stored descriptor is left unchanged.
    pub fn rename(&self, color_id: u8, descriptor: &str) -> Result<PinColor> {
        if !is_valid_color_id(i64::from(color_id)) {
            return Err(Error::validation(format!(
                "color id {color_id} is out of range (0-{})",
                PIN_COLOR_COUNT - 1
            )));
        }
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(Error::validation("color descriptor cannot be blank"));
        }

        let updated = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pin_colors SET descriptor = ?1 WHERE color_id = ?2",
                params![descriptor, i64::from(color_id)],
            )
        })?;
        if updated == 0 {
            return Err(Error::ConsistencyViolation(format!(
                "color {color_id} is missing; table was not bootstrapped"
            )));
        }

        info!(color_id, descriptor, "Renamed color");
        self.bus.publish(Event::ColorTableReloaded);

        self.get(color_id)?.ok_or_else(|| {
            Error::ConsistencyViolation(format!("color {color_id} vanished after rename"))
        })
    }

    /// All colors ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all(&self) -> Result<Vec<PinColor>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT color_id, name, descriptor FROM pin_colors ORDER BY color_id ASC",
            )?;
            let rows = stmt.query_map([], row_to_color)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(Error::from)
        })
    }

    /// Look up a single color.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, color_id: u8) -> Result<Option<PinColor>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT color_id, name, descriptor FROM pin_colors WHERE color_id = ?1",
                params![i64::from(color_id)],
                row_to_color,
            )
            .optional()
            .map_err(Error::from)
        })
    }

    /// Whether a row exists for `color_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn contains(&self, color_id: u8) -> Result<bool> {
        Ok(self.get(color_id)?.is_some())
    }
}

fn row_to_color(row: &rusqlite::Row<'_>) -> rusqlite::Result<PinColor> {
    Ok(PinColor {
        color_id: row.get(0)?,
        name: row.get(1)?,
        descriptor: row.get(2)?,
    })
}
