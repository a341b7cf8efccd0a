//! Core types for the artifact queue.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;

use super::thumbnail::ThumbnailSpec;
use crate::reliability::RetryConfig;

/// Filesystem effect requested by a queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCommand {
    /// Write the full-size image and its thumbnail.
    Save,
    /// Remove the full-size image and its thumbnail.
    Delete,
}

impl ArtifactCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ArtifactCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ArtifactCommand {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ArtifactCommand {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "save" => Ok(Self::Save),
            "delete" => Ok(Self::Delete),
            other => Err(FromSqlError::Other(
                format!("unknown artifact command '{other}'").into(),
            )),
        }
    }
}

/// Persisted state of a queue row.
///
/// A row being applied is still `Pending` on disk: nothing about partial
/// progress is ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    /// Failed permanently; kept for the user to act on.
    Dead,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dead => "dead",
        }
    }
}

impl ToSql for RequestStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RequestStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(Self::Pending),
            "dead" => Ok(Self::Dead),
            other => Err(FromSqlError::Other(
                format!("unknown request status '{other}'").into(),
            )),
        }
    }
}

/// A row of the `artifact_requests` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRequest {
    /// Processing order; never reused.
    pub sequence: i64,
    pub command: ArtifactCommand,
    pub filename: String,
    /// Source bytes for `Save`.
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
    /// Pin whose edit produced this request.
    pub pin_id: Option<String>,
    pub status: RequestStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to be inserted into the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequest {
    pub command: ArtifactCommand,
    pub filename: String,
    pub payload: Option<Vec<u8>>,
    pub pin_id: Option<String>,
}

impl NewRequest {
    /// Save `payload` as `filename`.
    pub fn save(filename: impl Into<String>, payload: Vec<u8>, pin_id: Option<&str>) -> Self {
        Self {
            command: ArtifactCommand::Save,
            filename: filename.into(),
            payload: Some(payload),
            pin_id: pin_id.map(str::to_string),
        }
    }

    /// Delete `filename` and its thumbnail.
    pub fn delete(filename: impl Into<String>, pin_id: Option<&str>) -> Self {
        Self {
            command: ArtifactCommand::Delete,
            filename: filename.into(),
            payload: None,
            pin_id: pin_id.map(str::to_string),
        }
    }
}

/// Broadcast by the queue after each request settles.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// The filesystem effect is durable and the row was removed.
    Applied {
        sequence: i64,
        command: ArtifactCommand,
        filename: String,
    },
    /// The request failed permanently and was dead-lettered.
    DeadLettered {
        sequence: i64,
        command: ArtifactCommand,
        filename: String,
        pin_id: Option<String>,
        reason: String,
    },
}

/// Counts from one [`drain`](super::ArtifactQueue::drain) pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub dead_lettered: usize,
}

impl DrainReport {
    /// Total requests settled.
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied + self.dead_lettered
    }
}

/// Tuning for the artifact queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSettings {
    /// Backoff policy for transient failures.
    pub retry: RetryConfig,
    /// Thumbnail derivation for `Save` requests.
    pub thumbnail: ThumbnailSpec,
}
