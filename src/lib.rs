//! Pinboard: geographic bookmarks with crash-safe image artifacts.
//!
//! Pins (a coordinate, optional text, a color and an optional photo) live in
//! SQLite. Photos and their thumbnails live as files, written by a durable
//! queue whose rows are committed in the same transaction as the pin edit
//! that caused them. After any crash, replaying the queue brings storage back
//! in line with what the pins reference.
//!
//! # Components
//!
//! - [`colors`] - The 14 built-in pin colors and their user nicknames
//! - [`pins`] - Pin CRUD; image edits enqueue artifact requests
//! - [`artifacts`] - The artifact queue, storage backends and thumbnailing
//! - [`cache`] - Two-tier (memory + storage) decoded image cache
//! - [`bus`] - In-process change notifications
//! - [`app`] - [`Pinboard`], which wires the above together
//!
//! # Example
//!
//! ```no_run
//! use pinboard::{Config, Pinboard, PinDraft};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let board = Pinboard::open(&Config::default()).await?;
//! let pin = board
//!     .pins()
//!     .create(PinDraft::new(46.5197, 6.6323).with_name("Lausanne"))?;
//! board.recenter(pin.latitude, pin.longitude);
//! board.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod artifacts;
pub mod bus;
pub mod cache;
pub mod colors;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod pins;
pub mod reliability;
pub mod store;
pub mod ui;

#[cfg(test)]
mod test_support;

pub use app::{Pinboard, Settings};
pub use config::Config;
pub use error::{Error, Result};
pub use pins::{ImageChange, Pin, PinDraft};
