//! Pin commands.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

use pinboard::cache::ImageState;
use pinboard::ui::{format_age, format_bytes, format_coordinate, pin_line};
use pinboard::{Pin, PinDraft, Pinboard};

use super::print_json;

pub struct AddArgs {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub details: Option<String>,
    pub altitude: f64,
    pub color: u8,
    pub image: Option<PathBuf>,
}

pub struct EditArgs {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: Option<String>,
    pub details: Option<String>,
    pub altitude: Option<f64>,
    pub color: Option<u8>,
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {}", path.display()))
}

fn require_pin(board: &Pinboard, id: &str) -> Result<Pin> {
    board
        .pins()
        .get(id)?
        .with_context(|| format!("No pin with id '{id}'"))
}

pub async fn add(board: &Pinboard, args: AddArgs) -> Result<()> {
    let mut draft = PinDraft::new(args.latitude, args.longitude)
        .with_altitude(args.altitude)
        .with_color(args.color);
    draft.name = args.name;
    draft.details = args.details;
    if let Some(path) = &args.image {
        draft = draft.with_image(read_image(path).await?);
    }

    let pin = board.pins().create(draft).context("Failed to create pin")?;
    println!("Created pin {}", pin.id);
    Ok(())
}

pub fn edit(board: &Pinboard, id: &str, args: EditArgs) -> Result<()> {
    let current = require_pin(board, id)?;
    let mut draft = PinDraft::from_pin(&current);
    if let Some(latitude) = args.latitude {
        draft.latitude = latitude;
    }
    if let Some(longitude) = args.longitude {
        draft.longitude = longitude;
    }
    if let Some(altitude) = args.altitude {
        draft.altitude = altitude;
    }
    if let Some(color) = args.color {
        draft.color_id = color;
    }
    if args.name.is_some() {
        draft.name = args.name;
    }
    if args.details.is_some() {
        draft.details = args.details;
    }

    board
        .pins()
        .update(id, draft)
        .with_context(|| format!("Failed to update pin '{id}'"))?;
    println!("Updated pin {id}");
    Ok(())
}

pub fn remove(board: &Pinboard, id: &str) -> Result<()> {
    board
        .pins()
        .delete(id)
        .with_context(|| format!("Failed to delete pin '{id}'"))?;
    println!("Deleted pin {id}");
    Ok(())
}

pub async fn attach(board: &Pinboard, id: &str, image: &Path) -> Result<()> {
    let bytes = read_image(image).await?;
    let pin = board
        .pins()
        .attach_image(id, bytes)
        .with_context(|| format!("Failed to attach image to pin '{id}'"))?;
    println!(
        "Attached {} to pin {id} as {}",
        image.display(),
        pin.image_name.as_deref().unwrap_or("-")
    );
    Ok(())
}

pub fn detach(board: &Pinboard, id: &str) -> Result<()> {
    board
        .pins()
        .detach_image(id)
        .with_context(|| format!("Failed to detach image from pin '{id}'"))?;
    println!("Detached image from pin {id}");
    Ok(())
}

pub async fn show(board: &Pinboard, id: &str, json: bool) -> Result<()> {
    let pin = require_pin(board, id)?;
    if json {
        return print_json(&pin);
    }

    let color = board
        .colors()
        .get(pin.color_id)?
        .map_or_else(|| pin.color_id.to_string(), |c| c.descriptor);

    println!("Pin {}", pin.id);
    println!("  Name:      {}", pin.name.as_deref().unwrap_or("-"));
    println!("  Details:   {}", pin.details.as_deref().unwrap_or("-"));
    println!("  Location:  {}", format_coordinate(pin.latitude, pin.longitude));
    println!("  Altitude:  {:.1} m", pin.altitude);
    println!("  Color:     {color}");
    println!("  Modified:  {}", format_age(pin.last_modified, Utc::now()));

    let Some(name) = pin.image_name.as_deref() else {
        println!("  Image:     -");
        return Ok(());
    };
    let image = match board.cache().load(Some(name)).await? {
        ImageState::Loaded(image) => format!(
            "{name} ({}x{}, {})",
            image.width(),
            image.height(),
            format_bytes(image.bytes.len() as u64)
        ),
        _ if board.queue().has_pending_save(name)? => format!("{name} (pending)"),
        _ if board.queue().has_dead_save(name)? => {
            format!("{name} (failed, see `pinboard failures`)")
        },
        _ => format!("{name} (missing)"),
    };
    println!("  Image:     {image}");
    Ok(())
}

pub fn list(board: &Pinboard, json: bool) -> Result<()> {
    let pins = board.pins().list()?;
    if json {
        return print_json(&pins);
    }
    if pins.is_empty() {
        println!("No pins yet. Create one with `pinboard add --lat .. --lon ..`");
        return Ok(());
    }

    let colors = board.colors().all()?;
    let now = Utc::now();
    for pin in &pins {
        let color = colors
            .iter()
            .find(|c| c.color_id == pin.color_id)
            .map_or("?", |c| c.descriptor.as_str());
        println!("{}", pin_line(pin, color, now));
    }
    Ok(())
}
