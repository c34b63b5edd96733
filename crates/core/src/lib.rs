//! pondcast Core Library
//!
//! Shared utilities for the dataset builder:
//! - Configuration file discovery and loading (XDG-compliant)
//! - File system helpers
//! - Application-wide defaults

mod config;
pub mod fs;

pub use config::{
    find_config_file, get_xdg_cache_dir, get_xdg_data_dir, load_config, ConfigError, ConfigSource,
};
pub use fs::{create_dir_all, ensure_parent_dir, file_stem, path_exists};

/// Application name used for XDG paths
pub const APP_NAME: &str = "pondcast";

/// Timezone the field measurements are recorded in
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";

/// Seconds between export job status checks
pub const DEFAULT_POLL_INTERVAL: u64 = 60;

/// Give up on an export job after six hours
pub const DEFAULT_POLL_TIMEOUT: u64 = 6 * 60 * 60;
