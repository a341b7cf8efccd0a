//! CLI command implementations for pinboard.
//!
//! - [`pins`] - `add`, `edit`, `rm`, `show`, `list`, `attach`, `detach`
//! - [`colors`] - `colors`, `rename-color`
//! - [`queue`] - `drain`, `failures`, `retry`, `audit`

pub mod colors;
pub mod pins;
pub mod queue;

use anyhow::{Context, Result};
use serde::Serialize;

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
