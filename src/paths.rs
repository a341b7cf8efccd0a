//! Path utilities for pinboard data.
//!
//! - [`get_pinboard_dir`] - base directory (`PINBOARD_HOME` or platform data dir)
//! - [`get_database_path`] - `<dir>/pinboard.db`
//! - [`get_images_dir`] - `<dir>/images/`
//! - [`get_config_path`] - `<dir>/pinboard.toml`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::constants;

/// Get the pinboard base directory.
///
/// Resolution order:
/// 1. `PINBOARD_HOME` environment variable (if set and non-empty)
/// 2. `<platform data dir>/pinboard/`
pub fn get_pinboard_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(constants::HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let data = dirs::data_dir()
        .or_else(dirs::home_dir)
        .context("Failed to determine user data directory")?;
    Ok(data.join(constants::APP_DIR_NAME))
}

/// Get the SQLite database path inside `dir`.
pub fn get_database_path(dir: &Path) -> PathBuf {
    dir.join(constants::DATABASE_FILE)
}

/// Get the artifact directory inside `dir`.
pub fn get_images_dir(dir: &Path) -> PathBuf {
    dir.join(constants::IMAGES_DIR)
}

/// Get the default configuration file path.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_pinboard_dir()?.join(constants::CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_home_env_override() {
        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var(constants::HOME_ENV, "/tmp/pinboard-test-home") };
        let dir = get_pinboard_dir().unwrap();
        unsafe { std::env::remove_var(constants::HOME_ENV) };

        assert_eq!(dir, PathBuf::from("/tmp/pinboard-test-home"));
    }

    #[test]
    #[serial]
    fn test_empty_home_env_is_ignored() {
        unsafe { std::env::set_var(constants::HOME_ENV, "") };
        let dir = get_pinboard_dir().unwrap();
        unsafe { std::env::remove_var(constants::HOME_ENV) };

        assert!(dir.ends_with(constants::APP_DIR_NAME));
    }

    #[test]
    fn test_derived_paths() {
        let base = Path::new("/data/pins");
        assert_eq!(get_database_path(base), base.join("pinboard.db"));
        assert_eq!(get_images_dir(base), base.join("images"));
    }
}
