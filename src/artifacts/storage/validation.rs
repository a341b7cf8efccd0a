//! Artifact name validation.
//!
//! Artifacts live in a single flat directory, so a valid name is one
//! normal path component: no separators, no `..`, nothing hidden.

use std::io;
use std::path::{Component, Path};

/// Validates an artifact name.
///
/// # Errors
///
/// Returns [`io::ErrorKind::InvalidInput`] for names that:
/// - Are empty
/// - Start with `.` (hidden files, temp files, `..`)
/// - Contain a path separator or anything but a single normal component
///
/// # Examples
/// ```
/// use pinboard::artifacts::storage::validate_name;
///
/// assert!(validate_name("3f2a.jpg").is_ok());
/// assert!(validate_name("../etc/passwd").is_err());
/// assert!(validate_name("nested/a.jpg").is_err());
/// assert!(validate_name("").is_err());
/// ```
pub fn validate_name(name: &str) -> io::Result<()> {
    let invalid = |reason: &str| {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid artifact name '{name}': {reason}"),
        ))
    };

    if name.is_empty() {
        return invalid("empty");
    }
    if name.starts_with('.') {
        return invalid("must not start with '.'");
    }
    if name.contains(['/', '\\']) {
        return invalid("must not contain path separators");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => invalid("must be a single file name"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("a.jpg").is_ok());
        assert!(validate_name("thumb_a.jpg").is_ok());
        assert!(validate_name("0b5c2c8e-4d0c-4a43-9d55-1d2b0a0c9f11.jpg").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".", "..", ".hidden", "a/b.jpg", "a\\b.jpg", "/abs.jpg"] {
            let err = validate_name(name).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name}");
        }
    }
}
