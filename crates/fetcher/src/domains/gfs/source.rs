use crate::{
    decode_message, field_pattern, find_entry, parse_idx, DecodeError, FetchError, GribFetcher,
    Grid, IndexError, Level, ModelRun, Parameter,
};
use async_trait::async_trait;
use log::{info, warn};

/// GFS 0.25° pressure-level product.
pub const GFS_PRODUCT: &str = "pgrb2.0p25";

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no message matching '{pattern}' in {url}")]
    FieldNotFound { pattern: String, url: String },
    #[error("no GFS mirrors configured")]
    NoMirrors,
}

/// Where model fields come from.
#[async_trait]
pub trait GribSource: Send + Sync {
    async fn fetch_field(
        &self,
        run: &ModelRun,
        parameter: &Parameter,
        level: &Level,
    ) -> Result<Grid, SourceError>;
}

/// Reads single messages from the NOAA open-data mirrors via their `.idx` inventories.
pub struct NoaaSource {
    fetcher: GribFetcher,
    mirrors: Vec<String>,
}

impl NoaaSource {
    pub fn new(fetcher: GribFetcher, mirrors: Vec<String>) -> Self {
        Self { fetcher, mirrors }
    }

    async fn fetch_from(
        &self,
        mirror: &str,
        run: &ModelRun,
        parameter: &Parameter,
        level: &Level,
    ) -> Result<Grid, SourceError> {
        let url = file_url(mirror, run);
        let pattern = field_pattern(parameter, level)?;

        let inventory = self.fetcher.fetch_text(&format!("{}.idx", url)).await?;
        let entries = parse_idx(&inventory)?;
        let entry =
            find_entry(&entries, &pattern).ok_or_else(|| SourceError::FieldNotFound {
                pattern: pattern.to_string(),
                url: url.clone(),
            })?;

        info!(
            "downloading {} {} from {} ({})",
            parameter.idx_name,
            level,
            url,
            entry.range_header()
        );
        let bytes = self.fetcher.fetch_range(&url, &entry.range_header()).await?;
        Ok(decode_message(bytes)?)
    }
}

#[async_trait]
impl GribSource for NoaaSource {
    async fn fetch_field(
        &self,
        run: &ModelRun,
        parameter: &Parameter,
        level: &Level,
    ) -> Result<Grid, SourceError> {
        let mut last_error = None;
        for mirror in &self.mirrors {
            match self.fetch_from(mirror, run, parameter, level).await {
                Ok(grid) => return Ok(grid),
                // every mirror carries the same inventory
                Err(err @ SourceError::FieldNotFound { .. }) => return Err(err),
                Err(err) => {
                    warn!("mirror {} failed for {}: {}", mirror, run, err);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(SourceError::NoMirrors))
    }
}

/// `{mirror}/gfs.YYYYMMDD/HH/atmos/gfs.tHHz.pgrb2.0p25.fFFF`
pub fn file_url(mirror: &str, run: &ModelRun) -> String {
    let stamp = run.init_stamp();
    let (date, cycle) = stamp.split_at(8);
    format!(
        "{}/gfs.{}/{}/atmos/gfs.t{}z.{}.f{:03}",
        mirror.trim_end_matches('/'),
        date,
        cycle,
        cycle,
        GFS_PRODUCT,
        run.fxx
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn builds_mirror_urls() {
        let run = ModelRun {
            init: datetime!(2024-05-12 06:00 UTC),
            fxx: 8,
        };
        assert_eq!(
            file_url("https://noaa-gfs-bdp-pds.s3.amazonaws.com/", &run),
            "https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.20240512/06/atmos/gfs.t06z.pgrb2.0p25.f008"
        );
    }
}
