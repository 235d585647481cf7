use crate::ForecastKey;
use log::{debug, info};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Converted artifacts on local disk, one JSON file per forecast key.
///
/// A file's existence is the only validity check; nothing ever expires.
#[derive(Debug, Clone)]
pub struct ForecastCache {
    dir: PathBuf,
}

impl ForecastCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &ForecastKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub async fn load(&self, key: &ForecastKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("cache hit: {}", path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Write an artifact through a temporary file so readers never see a partial one.
    pub async fn store(&self, key: &ForecastKey, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.path(key);
        let write_error = |source| CacheError::Write {
            path: path.display().to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(write_error)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key.file_name(), std::process::id()));
        fs::write(&tmp, bytes).await.map_err(write_error)?;
        fs::rename(&tmp, &path).await.map_err(write_error)?;

        info!("cached {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}
