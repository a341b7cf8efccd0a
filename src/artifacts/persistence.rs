//! Persistence layer for the artifact queue.
//!
//! Every function takes a plain `Connection` so it can run either on its own
//! or inside a caller's transaction (a `Transaction` derefs to `Connection`).

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::types::{ArtifactCommand, ArtifactRequest, NewRequest, RequestStatus};

const COLUMNS: &str =
    "sequence, command, filename, payload, pin_id, status, attempts, last_error, created_at";

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtifactRequest> {
    Ok(ArtifactRequest {
        sequence: row.get(0)?,
        command: row.get(1)?,
        filename: row.get(2)?,
        payload: row.get(3)?,
        pin_id: row.get(4)?,
        status: row.get(5)?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Append a request; returns its sequence number.
pub(crate) fn insert(conn: &Connection, request: &NewRequest) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO artifact_requests (command, filename, payload, pin_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            request.command,
            request.filename,
            request.payload,
            request.pin_id,
            RequestStatus::Pending,
            Utc::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Lowest-sequence pending request.
pub(crate) fn next_pending(conn: &Connection) -> rusqlite::Result<Option<ArtifactRequest>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM artifact_requests
             WHERE status = 'pending' ORDER BY sequence ASC LIMIT 1"
        ),
        [],
        row_to_request,
    )
    .optional()
}

/// All requests with `status`, in sequence order.
pub(crate) fn list(
    conn: &Connection,
    status: RequestStatus,
) -> rusqlite::Result<Vec<ArtifactRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM artifact_requests WHERE status = ?1 ORDER BY sequence ASC"
    ))?;
    let rows = stmt.query_map(params![status], row_to_request)?;
    rows.collect()
}

/// Remove a settled request. Returns false if it was already gone.
pub(crate) fn remove(conn: &Connection, sequence: i64) -> rusqlite::Result<bool> {
    let removed = conn.execute(
        "DELETE FROM artifact_requests WHERE sequence = ?1",
        params![sequence],
    )?;
    Ok(removed > 0)
}

/// Move a pending request to the dead-letter state.
pub(crate) fn mark_dead(
    conn: &Connection,
    sequence: i64,
    attempts: u32,
    reason: &str,
) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE artifact_requests
         SET status = 'dead', attempts = attempts + ?2, last_error = ?3
         WHERE sequence = ?1 AND status = 'pending'",
        params![sequence, attempts, reason],
    )?;
    Ok(updated > 0)
}

/// Put a dead-lettered request back in line (keeps its sequence).
pub(crate) fn revive(conn: &Connection, sequence: i64) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE artifact_requests SET status = 'pending', last_error = NULL
         WHERE sequence = ?1 AND status = 'dead'",
        params![sequence],
    )?;
    Ok(updated > 0)
}

/// Drop dead-lettered saves for `filename`. Returns how many were removed.
pub(crate) fn discard_dead_saves(conn: &Connection, filename: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM artifact_requests
         WHERE filename = ?1 AND command = ?2 AND status = ?3",
        params![filename, ArtifactCommand::Save, RequestStatus::Dead],
    )
}

/// Whether dead request `sequence` has a later request for the same filename.
pub(crate) fn superseded(conn: &Connection, sequence: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM artifact_requests dead
             JOIN artifact_requests later ON later.filename = dead.filename
             WHERE dead.sequence = ?1 AND dead.status = 'dead'
               AND later.sequence > dead.sequence
         )",
        params![sequence],
        |row| row.get(0),
    )
}

/// Drop a dead-lettered request.
pub(crate) fn discard(conn: &Connection, sequence: i64) -> rusqlite::Result<bool> {
    let removed = conn.execute(
        "DELETE FROM artifact_requests WHERE sequence = ?1 AND status = 'dead'",
        params![sequence],
    )?;
    Ok(removed > 0)
}

/// Whether a request for `filename` exists with the given command and status.
pub(crate) fn exists(
    conn: &Connection,
    filename: &str,
    command: ArtifactCommand,
    status: RequestStatus,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM artifact_requests
             WHERE filename = ?1 AND command = ?2 AND status = ?3
         )",
        params![filename, command, status],
        |row| row.get(0),
    )
}

/// Most recent request touching `filename`, any status.
pub(crate) fn latest_for(
    conn: &Connection,
    filename: &str,
) -> rusqlite::Result<Option<ArtifactRequest>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM artifact_requests
             WHERE filename = ?1 ORDER BY sequence DESC LIMIT 1"
        ),
        params![filename],
        row_to_request,
    )
    .optional()
}
