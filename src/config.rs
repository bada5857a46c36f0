//! Application configuration loaded from environment variables.
//!
//! The core is a library; configuration is read once by the embedding app
//! and passed down at construction time.

use std::env;

/// Core configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Placeholder profile image locator assigned to new accounts.
    ///
    /// The shared placeholder blob must never be deleted when a user
    /// replaces their picture.
    pub default_image_locator: String,
    /// Optional byte budget for the resource cache. `None` disables
    /// eviction (entries live for the process lifetime).
    pub resource_cache_max_bytes: Option<usize>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            default_image_locator: "blob://profile-images/default-profile-image.jpg".to_string(),
            resource_cache_max_bytes: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Both settings have safe defaults, so this never fails on a clean
    /// environment; a malformed cache budget is an error rather than a
    /// silently unbounded cache.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let default_image_locator = env::var("MUSTER_DEFAULT_IMAGE_LOCATOR")
            .unwrap_or_else(|_| Self::default().default_image_locator);

        let resource_cache_max_bytes = match env::var("MUSTER_CACHE_MAX_BYTES") {
            Ok(raw) => Some(
                raw.parse()
                    .map_err(|_| ConfigError::Invalid("MUSTER_CACHE_MAX_BYTES"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            default_image_locator,
            resource_cache_max_bytes,
        })
    }

    /// Default config for tests (alias kept for symmetry with `Default`).
    pub fn test_default() -> Self {
        Self::default()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
