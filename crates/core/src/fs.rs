//! Filesystem utilities

use std::fs;
use std::path::Path;

use log::info;

/// Create a directory and all of its parents if missing, logging when it is created.
pub fn create_dir_all<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}
