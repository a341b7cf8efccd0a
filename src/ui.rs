//! Terminal output formatting for the CLI.

use chrono::{DateTime, Utc};

use crate::pins::Pin;

/// Width of box separators.
const BOX_WIDTH: usize = 60;

/// Print a boxed error list to stderr.
///
/// ```text
/// ============================================================
/// Audit failed
/// ============================================================
///
/// 1. pin ... references image ...
/// ```
pub fn print_error_box(title: &str, lines: &[String]) {
    eprintln!("\n{}", "=".repeat(BOX_WIDTH));
    eprintln!("{title}");
    eprintln!("{}", "=".repeat(BOX_WIDTH));

    if !lines.is_empty() {
        eprintln!();
        for (i, line) in lines.iter().enumerate() {
            eprintln!("{}. {line}", i + 1);
        }
    }
}

/// Format a latitude/longitude pair with hemisphere letters.
///
/// # Examples
///
/// ```
/// use pinboard::ui::format_coordinate;
///
/// assert_eq!(format_coordinate(46.5197, 6.6323), "46.51970°N 6.63230°E");
/// assert_eq!(format_coordinate(-33.8688, -70.0), "33.86880°S 70.00000°W");
/// ```
pub fn format_coordinate(latitude: f64, longitude: f64) -> String {
    let ns = if latitude < 0.0 { 'S' } else { 'N' };
    let ew = if longitude < 0.0 { 'W' } else { 'E' };
    format!("{:.5}°{ns} {:.5}°{ew}", latitude.abs(), longitude.abs())
}

/// Format a byte count in human-readable form.
///
/// # Examples
///
/// ```
/// use pinboard::ui::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 bytes");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

/// How long ago `then` was, coarsely.
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h {}m ago", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h ago", secs / 86400, (secs % 86400) / 3600)
    }
}

/// One-line summary of a pin for `list`.
pub fn pin_line(pin: &Pin, color: &str, now: DateTime<Utc>) -> String {
    let name = pin.name.as_deref().unwrap_or("(unnamed)");
    let image = if pin.image_name.is_some() { " [img]" } else { "" };
    format!(
        "{}  {name:<24} {:<26} {color:<12} {}{image}",
        pin.id,
        format_coordinate(pin.latitude, pin.longitude),
        format_age(pin.last_modified, now),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(30), now), "30s ago");
        assert_eq!(format_age(now - Duration::seconds(150), now), "2m ago");
        assert_eq!(format_age(now - Duration::seconds(3660), now), "1h 1m ago");
        assert_eq!(format_age(now - Duration::seconds(90000), now), "1d 1h ago");
        assert_eq!(format_age(now + Duration::seconds(5), now), "0s ago");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 bytes");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_pin_line_marks_images() {
        let now = Utc::now();
        let pin = Pin {
            id: "id-1".to_string(),
            name: None,
            details: None,
            latitude: 1.0,
            longitude: -2.0,
            altitude: 0.0,
            color_id: 0,
            image_name: Some("a.jpg".to_string()),
            last_modified: now,
        };
        let line = pin_line(&pin, "Red", now);
        assert!(line.contains("(unnamed)"));
        assert!(line.contains("2.00000°W"));
        assert!(line.ends_with("[img]"));
    }
}
