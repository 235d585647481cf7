use crate::{
    fallback_runs, to_flat_record, to_point_record, CacheError, ForecastCache, ForecastKey, Grid,
    GridError, GribSource, Level, SourceError, Variable, VariableError, VariableRecord,
    DIVERGENCE,
};
use log::{debug, info, warn};
use serde_json::value::RawValue;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Variable(#[from] VariableError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("cached artifact {0} is not valid JSON")]
    CorruptArtifact(String),
    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no GFS run had {variable} {level} for {valid_time} after {attempts} attempts")]
    Exhausted {
        variable: Variable,
        level: Level,
        valid_time: OffsetDateTime,
        attempts: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// What the map asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub target: OffsetDateTime,
    pub variable: Variable,
    /// Pressure level in hPa, only used by isobaric variables
    pub level: Option<u16>,
    /// Point the map is centred on; grids are global so it only shows up in logs
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl ForecastRequest {
    pub fn new(target: OffsetDateTime, variable: Variable, level: Option<u16>) -> Self {
        Self {
            target,
            variable,
            level,
            lat: None,
            lon: None,
        }
    }
}

/// Resolves requests to model runs, serving from the cache and falling back to
/// earlier cycles when a run is not (yet) available.
pub struct ForecastService {
    source: Arc<dyn GribSource>,
    cache: ForecastCache,
    max_attempts: usize,
    fetch_lock: Mutex<()>,
}

impl ForecastService {
    pub fn new(source: Arc<dyn GribSource>, cache: ForecastCache, max_attempts: usize) -> Self {
        Self {
            source,
            cache,
            max_attempts,
            fetch_lock: Mutex::new(()),
        }
    }

    /// The JSON array of records for a request, byte-for-byte as stored in the cache.
    pub async fn get_variable(&self, req: &ForecastRequest) -> Result<Box<RawValue>, Error> {
        let level = req.variable.level(req.level)?;
        let keys: Vec<ForecastKey> = fallback_runs(req.target, req.variable, self.max_attempts)
            .into_iter()
            .map(|run| ForecastKey::new(req.variable, level, run))
            .collect();
        info!(
            "request {} {} at {} (lat: {:?}, lon: {:?})",
            req.variable, level, req.target, req.lat, req.lon
        );

        if let Some(cached) = self.load_any(&keys).await? {
            return Ok(cached);
        }

        // one fetch at a time, the cache directory is not locked
        let _guard = self.fetch_lock.lock().await;
        if let Some(cached) = self.load_any(&keys).await? {
            return Ok(cached);
        }

        for key in &keys {
            match self.build_records(key).await {
                Ok(records) => {
                    let bytes = serde_json::to_vec_pretty(&records)?;
                    self.cache.store(key, &bytes).await?;
                    return raw_json(key, bytes);
                }
                Err(err) => warn!("run {} unavailable for {}: {}", key.run, key.variable, err),
            }
        }

        Err(Error::Exhausted {
            variable: req.variable,
            level,
            valid_time: keys
                .first()
                .map(|k| k.run.valid_time())
                .unwrap_or(req.target),
            attempts: keys.len(),
        })
    }

    async fn load_any(&self, keys: &[ForecastKey]) -> Result<Option<Box<RawValue>>, Error> {
        for key in keys {
            if let Some(bytes) = self.cache.load(key).await? {
                return raw_json(key, bytes).map(Some);
            }
        }
        Ok(None)
    }

    async fn fetch(&self, key: &ForecastKey) -> Result<Vec<Grid>, BuildError> {
        let mut grids = vec![];
        for parameter in key.variable.sources() {
            grids.push(self.source.fetch_field(&key.run, parameter, &key.level).await?);
        }
        Ok(grids)
    }

    async fn build_records(&self, key: &ForecastKey) -> Result<Vec<VariableRecord>, BuildError> {
        debug!("fetching {}", key);
        let grids = self.fetch(key).await?;
        let sources = key.variable.sources();

        let records = match (key.variable, grids.as_slice()) {
            (Variable::Wind, [u, v]) => vec![
                to_flat_record(u, &sources[0], &key.level, &key.run),
                to_flat_record(v, &sources[1], &key.level, &key.run),
            ],
            (Variable::Divergence, [u, v]) => {
                let divergence = Grid::divergence(u, v)?;
                vec![to_point_record(&divergence, &DIVERGENCE, &key.level, &key.run)]
            }
            _ => grids
                .iter()
                .zip(sources)
                .map(|(grid, parameter)| to_point_record(grid, parameter, &key.level, &key.run))
                .collect(),
        };
        Ok(records)
    }
}

fn raw_json(key: &ForecastKey, bytes: Vec<u8>) -> Result<Box<RawValue>, Error> {
    String::from_utf8(bytes)
        .ok()
        .and_then(|text| RawValue::from_string(text).ok())
        .ok_or_else(|| Error::CorruptArtifact(key.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelRun, Parameter, UGRD};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    /// Serves a small grid for runs initialised at or before `available_until`.
    struct StubSource {
        available_until: OffsetDateTime,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(available_until: OffsetDateTime) -> Self {
            Self {
                available_until,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GribSource for StubSource {
        async fn fetch_field(
            &self,
            run: &ModelRun,
            parameter: &Parameter,
            _level: &Level,
        ) -> Result<Grid, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if run.init > self.available_until {
                return Err(SourceError::FieldNotFound {
                    pattern: parameter.idx_name.to_string(),
                    url: run.to_string(),
                });
            }
            let base = if parameter == &UGRD { 1.0 } else { -1.0 };
            Ok(Grid::new(
                vec![1.0, 0.0, -1.0],
                vec![-1.0, 0.0, 1.0],
                vec![base, f64::NAN, base, base, base, base, base, base, base],
            )
            .unwrap())
        }
    }

    fn service(source: Arc<StubSource>, dir: &std::path::Path) -> ForecastService {
        ForecastService::new(source, ForecastCache::new(dir), 4)
    }

    #[tokio::test]
    async fn wind_is_two_flat_components() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource::new(datetime!(2030-01-01 00:00 UTC)));
        let service = service(source.clone(), dir.path());

        let req = ForecastRequest::new(datetime!(2024-05-12 14:20 UTC), Variable::Wind, None);
        let raw = service.get_variable(&req).await.unwrap();
        let value: Value = serde_json::from_str(raw.get()).unwrap();

        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["header"]["parameterNumber"], 2);
        assert_eq!(value[1]["header"]["parameterNumber"], 3);
        assert_eq!(value[0]["header"]["forecastTime"], 2);
        assert_eq!(value[0]["data"][1], Value::Null);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn cached_key_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource::new(datetime!(2030-01-01 00:00 UTC)));
        let service = service(source.clone(), dir.path());
        let req = ForecastRequest::new(datetime!(2024-05-12 14:00 UTC), Variable::Cape, None);

        let first = service.get_variable(&req).await.unwrap();
        let calls = source.calls();
        let second = service.get_variable(&req).await.unwrap();

        assert_eq!(source.calls(), calls);
        assert_eq!(first.get(), second.get());

        let on_disk = std::fs::read_to_string(
            dir.path().join("gfs_cape_surface_2024051212_f002.json"),
        )
        .unwrap();
        assert_eq!(on_disk, second.get());
    }

    #[tokio::test]
    async fn falls_back_to_earlier_cycles() {
        let dir = tempfile::tempdir().unwrap();
        // the 12z and 06z runs are not out yet
        let source = Arc::new(StubSource::new(datetime!(2024-05-12 00:00 UTC)));
        let service = service(source.clone(), dir.path());

        let req = ForecastRequest::new(datetime!(2024-05-12 14:00 UTC), Variable::Refc, None);
        let raw = service.get_variable(&req).await.unwrap();
        let value: Value = serde_json::from_str(raw.get()).unwrap();

        assert_eq!(value[0]["header"]["refTime"], "2024-05-12 00:00:00");
        assert_eq!(value[0]["header"]["forecastTime"], 14);
        assert_eq!(source.calls(), 3);
        assert!(dir
            .path()
            .join("gfs_refc_atmos_2024051200_f014.json")
            .exists());

        // a repeat request finds the fallback artifact without fetching
        service.get_variable(&req).await.unwrap();
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_fallback_window() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource::new(datetime!(2000-01-01 00:00 UTC)));
        let service = service(source.clone(), dir.path());

        let req = ForecastRequest::new(datetime!(2024-05-12 14:00 UTC), Variable::Cin, None);
        let err = service.get_variable(&req).await.unwrap_err();

        assert!(matches!(err, Error::Exhausted { attempts: 4, .. }));
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn point_output_has_no_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource::new(datetime!(2030-01-01 00:00 UTC)));
        let service = service(source, dir.path());

        for variable in [Variable::SfcTemp, Variable::Divergence] {
            let req = ForecastRequest::new(datetime!(2024-05-12 06:00 UTC), variable, Some(850));
            let raw = service.get_variable(&req).await.unwrap();
            let value: Value = serde_json::from_str(raw.get()).unwrap();
            let points = value[0]["data"].as_array().unwrap();
            assert!(points.iter().all(|p| p["value"].is_number()));
        }
    }

    #[tokio::test]
    async fn rejects_unknown_pressure_level() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource::new(datetime!(2030-01-01 00:00 UTC)));
        let service = service(source.clone(), dir.path());

        let req = ForecastRequest::new(datetime!(2024-05-12 06:00 UTC), Variable::Vvel, Some(123));
        let err = service.get_variable(&req).await.unwrap_err();
        assert!(matches!(err, Error::Variable(_)));
        assert_eq!(source.calls(), 0);
    }
}
