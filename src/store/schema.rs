//! Schema definition and migration for the pinboard database.

use rusqlite::Connection;

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS pin_colors (
    color_id    INTEGER PRIMARY KEY CHECK (color_id BETWEEN 0 AND 13),
    name        TEXT NOT NULL,
    descriptor  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pins (
    id              TEXT PRIMARY KEY,
    name            TEXT,
    details         TEXT,
    latitude        REAL NOT NULL,
    longitude       REAL NOT NULL,
    altitude        REAL NOT NULL DEFAULT 0,
    color_id        INTEGER NOT NULL CHECK (color_id BETWEEN 0 AND 13),
    image_name      TEXT,
    last_modified   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pins_last_modified ON pins(last_modified DESC);

-- sequence is AUTOINCREMENT so it is never reused after a row is removed.
CREATE TABLE IF NOT EXISTS artifact_requests (
    sequence    INTEGER PRIMARY KEY AUTOINCREMENT,
    command     TEXT NOT NULL CHECK (command IN ('save', 'delete')),
    filename    TEXT NOT NULL,
    payload     BLOB,
    pin_id      TEXT,
    status      TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'dead')),
    attempts    INTEGER NOT NULL DEFAULT 0,
    last_error  TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifact_requests_status
    ON artifact_requests(status, sequence);
CREATE INDEX IF NOT EXISTS idx_artifact_requests_filename
    ON artifact_requests(filename);
";

/// Bring the schema up to [`SCHEMA_VERSION`].
pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    }

    Ok(())
}
