//! Color table commands.

use anyhow::{Context, Result};

use pinboard::Pinboard;

pub fn list(board: &Pinboard) -> Result<()> {
    for color in board.colors().all()? {
        let nickname = if color.descriptor == color.name {
            String::new()
        } else {
            format!("  \"{}\"", color.descriptor)
        };
        println!("{:>2}  {:<8} {}{nickname}", color.color_id, color.name, color.hex());
    }
    Ok(())
}

pub fn rename(board: &Pinboard, color_id: u8, descriptor: &str) -> Result<()> {
    let color = board
        .colors()
        .rename(color_id, descriptor)
        .with_context(|| format!("Failed to rename color {color_id}"))?;
    println!("{} is now \"{}\"", color.name, color.descriptor);
    Ok(())
}
