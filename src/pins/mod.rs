//! Pin repository.
//!
//! Pins are rows in the `pins` table. Every mutation that touches an image
//! enqueues the matching artifact request inside the same transaction, so a
//! pin never references an image that is neither stored nor on its way.

mod repository;
mod types;


pub use repository::PinRepository;
pub use types::{ImageChange, ImageFailure, Pin, PinDraft};
