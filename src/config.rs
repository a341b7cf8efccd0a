//! Configuration types for pinboard.
//!
//! Loads `pinboard.toml`, fills defaults for anything omitted, and validates
//! the result:
//!
//! - [`Config`] - Root configuration struct
//! - [`StorageConfig`] - Data directory override
//! - [`CacheConfig`] - In-memory image cache sizing
//! - [`ThumbnailConfig`] - Derived thumbnail size and quality
//! - [`QueueConfig`] - Artifact queue retry policy
//!
//! Every section is optional; an empty file (or no file at all) yields
//! [`Config::default`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::Settings;
use crate::artifacts::{QueueSettings, ThumbnailSpec};
use crate::constants;
use crate::paths;
use crate::reliability::RetryConfig;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// pinboard.toml configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub thumbnail: ThumbnailConfig,
    pub queue: QueueConfig,
}

/// Where the database and artifacts live.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Overrides `PINBOARD_HOME` and the platform data directory.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of decoded images held in memory.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    /// Longest side of a thumbnail in pixels.
    pub size: u32,
    /// JPEG quality (1-100).
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size: constants::DEFAULT_THUMBNAIL_SIZE,
            quality: constants::DEFAULT_THUMBNAIL_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Retries for a transient failure before the request is dead-lettered.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_QUEUE_MAX_RETRIES,
            initial_delay_ms: constants::DEFAULT_QUEUE_INITIAL_DELAY_MS,
            max_delay_ms: constants::DEFAULT_QUEUE_MAX_DELAY_MS,
        }
    }
}

impl Config {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has the wrong type or is unknown
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory for this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is set and the platform data
    /// directory cannot be determined.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::get_pinboard_dir(),
        }
    }

    /// Retry policy for the artifact queue.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.queue.max_retries)
            .with_initial_delay(Duration::from_millis(self.queue.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.queue.max_delay_ms))
    }

    /// Component settings derived from this configuration.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            cache_capacity: self.cache.capacity,
            queue: QueueSettings {
                retry: self.retry_config(),
                thumbnail: ThumbnailSpec {
                    size: self.thumbnail.size,
                    quality: self.thumbnail.quality,
                },
            },
        }
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every fatal problem:
    /// - Zero cache capacity or thumbnail size
    /// - Thumbnail quality outside 1-100
    /// - Initial retry delay larger than the maximum delay
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.cache.capacity == 0 {
            errors.push(format!(
                "cache.capacity cannot be 0 (default: {})",
                constants::DEFAULT_CACHE_CAPACITY
            ));
        } else if self.cache.capacity > 1000 {
            warnings.push(format!(
                "cache.capacity {} is very high; decoded images may consume excessive memory",
                self.cache.capacity
            ));
        }

        if self.thumbnail.size == 0 {
            errors.push("thumbnail.size cannot be 0".to_string());
        } else if self.thumbnail.size > 1024 {
            warnings.push(format!(
                "thumbnail.size {} is larger than typical list cells",
                self.thumbnail.size
            ));
        }

        if !(1..=100).contains(&self.thumbnail.quality) {
            errors.push(format!(
                "thumbnail.quality must be between 1 and 100 (got: {})",
                self.thumbnail.quality
            ));
        }

        if self.queue.initial_delay_ms > self.queue.max_delay_ms {
            errors.push(format!(
                "queue.initial_delay_ms ({}) cannot exceed queue.max_delay_ms ({})",
                self.queue.initial_delay_ms, self.queue.max_delay_ms
            ));
        }

        if self.queue.max_retries == 0 {
            warnings.push(
                "queue.max_retries is 0; transient storage errors will be dead-lettered immediately"
                    .to_string(),
            );
        }

        if let Some(dir) = &self.storage.data_dir
            && dir.exists()
            && !dir.is_dir()
        {
            errors.push(format!(
                "storage.data_dir is not a directory: {}",
                dir.display()
            ));
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
