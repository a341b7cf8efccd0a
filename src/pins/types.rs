//! Pin records and edit drafts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::artifacts::ArtifactCommand;

/// A bookmarked location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    /// UUID v4, assigned at creation.
    pub id: String,
    pub name: Option<String>,
    pub details: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub altitude: f64,
    pub color_id: u8,
    /// Full-size artifact name; the thumbnail name is derived from it.
    pub image_name: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// What to do with a pin's image on save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageChange {
    /// Leave the current image (or lack of one) alone.
    #[default]
    Keep,
    /// Store these encoded bytes under a fresh name.
    Replace(Vec<u8>),
    /// Drop the current image.
    Remove,
}

/// Field values for [`create`](super::PinRepository::create) and
/// [`update`](super::PinRepository::update).
///
/// Name and details are trimmed; blank values are stored as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct PinDraft {
    pub name: Option<String>,
    pub details: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub color_id: u8,
    pub image: ImageChange,
}

impl PinDraft {
    /// A draft at the given coordinate with no text, zero altitude and the
    /// first color.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            name: None,
            details: None,
            latitude,
            longitude,
            altitude: 0.0,
            color_id: 0,
            image: ImageChange::Keep,
        }
    }

    /// A draft reproducing `pin` exactly, image kept.
    pub fn from_pin(pin: &Pin) -> Self {
        Self {
            name: pin.name.clone(),
            details: pin.details.clone(),
            latitude: pin.latitude,
            longitude: pin.longitude,
            altitude: pin.altitude,
            color_id: pin.color_id,
            image: ImageChange::Keep,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    #[must_use]
    pub fn with_color(mut self, color_id: u8) -> Self {
        self.color_id = color_id;
        self
    }

    #[must_use]
    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = ImageChange::Replace(bytes);
        self
    }

    #[must_use]
    pub fn without_image(mut self) -> Self {
        self.image = ImageChange::Remove;
        self
    }
}

/// A pin image save or delete that was dead-lettered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageFailure {
    /// Queue sequence, for retrying or discarding.
    pub sequence: i64,
    /// A failed save leaves the image unstored; a failed delete leaves it
    /// on disk.
    pub command: ArtifactCommand,
    pub pin_id: String,
    pub filename: String,
    pub reason: Option<String>,
    pub attempts: u32,
    /// Whether the pin still points at this image.
    pub still_referenced: bool,
}
