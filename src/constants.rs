//! Shared constants for pinboard.
//!
//! Defaults used by the configuration layer and the components it wires up.

/// Environment variable that overrides the data directory.
pub const HOME_ENV: &str = "PINBOARD_HOME";

/// Directory name used under the platform data directory.
pub const APP_DIR_NAME: &str = "pinboard";

/// SQLite database file name inside the data directory.
pub const DATABASE_FILE: &str = "pinboard.db";

/// Configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "pinboard.toml";

/// Directory (inside the data directory) holding image artifacts.
pub const IMAGES_DIR: &str = "images";

/// Prefix that turns an image name into its thumbnail name.
pub const THUMBNAIL_PREFIX: &str = "thumb_";

/// Extension given to generated image names.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Default number of decoded images kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Default longest side of a generated thumbnail, in pixels.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 160;

/// Default JPEG quality for generated thumbnails.
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 80;

/// Default number of retries for a transient artifact failure.
pub const DEFAULT_QUEUE_MAX_RETRIES: u32 = 4;

/// Default delay before the first artifact retry.
pub const DEFAULT_QUEUE_INITIAL_DELAY_MS: u64 = 200;

/// Default upper bound on the delay between artifact retries.
pub const DEFAULT_QUEUE_MAX_DELAY_MS: u64 = 5_000;

/// Capacity of the broadcast channels used for bus and queue events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Callbacks kept per missing image; the oldest are dropped beyond this.
pub const MAX_WAITERS_PER_IMAGE: usize = 16;

/// Number of built-in pin colors.
pub const PIN_COLOR_COUNT: u8 = 14;
