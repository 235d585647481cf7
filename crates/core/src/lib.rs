//! GFS Relay Core Library
//!
//! Shared utilities for the relay and fetcher services:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - Common defaults

mod config;
pub mod fs;

pub use config::{find_config_file, load_config, ConfigSource};
pub use fs::create_dir_all;

/// Application name used for XDG paths
pub const APP_NAME: &str = "gfs-relay";

/// Default relay port, the one the browser extension talks to
pub const DEFAULT_RELAY_PORT: u16 = 8000;

/// Default fetcher warm-up interval (one GFS cycle, 6 hours)
pub const DEFAULT_FETCH_INTERVAL: u64 = 21600;

/// Default number of model runs tried for one request (primary + 3 earlier cycles)
pub const DEFAULT_MAX_ATTEMPTS: usize = 4;

/// Default cache directory for converted JSON artifacts
pub const DEFAULT_CACHE_DIR: &str = "./data";

/// Default GFS mirrors, tried in order
pub const DEFAULT_SOURCE_URLS: [&str; 3] = [
    "https://noaa-gfs-bdp-pds.s3.amazonaws.com",
    "https://nomads.ncep.noaa.gov/pub/data/nccf/com/gfs/prod",
    "https://storage.googleapis.com/global-forecast-system",
];

pub fn default_source_urls() -> Vec<String> {
    DEFAULT_SOURCE_URLS.iter().map(|u| u.to_string()).collect()
}
