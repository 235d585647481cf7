use crate::{ForecastRequest, ForecastService, Variable};
use log::{error, info};
use time::{Duration, OffsetDateTime};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmReport {
    pub ready: usize,
    pub failed: usize,
}

/// Requests covering `now` and each of the next `hours` hours.
///
/// Isobaric variables get one request per level, the rest one per hour.
pub fn warm_targets(
    now: OffsetDateTime,
    hours: u16,
    variables: &[Variable],
    levels: &[u16],
) -> Vec<ForecastRequest> {
    let mut requests = vec![];
    for hour in 0..=hours {
        let target = now + Duration::hours(i64::from(hour));
        for variable in variables {
            if variable.is_isobaric() {
                for level in levels {
                    requests.push(ForecastRequest::new(target, *variable, Some(*level)));
                }
            } else {
                requests.push(ForecastRequest::new(target, *variable, None));
            }
        }
    }
    requests
}

/// Run every request through the service; failures are logged and counted, not fatal.
pub async fn warm_cache(service: &ForecastService, requests: &[ForecastRequest]) -> WarmReport {
    let mut report = WarmReport::default();
    for req in requests {
        match service.get_variable(req).await {
            Ok(_) => report.ready += 1,
            Err(err) => {
                error!("failed to warm {} at {}: {}", req.variable, req.target, err);
                report.failed += 1;
            }
        }
    }
    info!(
        "warm-up finished: {} ready, {} failed",
        report.ready, report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ForecastCache, GribSource, Grid, Level, ModelRun, Parameter, SourceError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use time::macros::datetime;

    struct SurfaceOnly;

    #[async_trait]
    impl GribSource for SurfaceOnly {
        async fn fetch_field(
            &self,
            run: &ModelRun,
            parameter: &Parameter,
            level: &Level,
        ) -> Result<Grid, SourceError> {
            if matches!(level, Level::Isobaric(_)) {
                return Err(SourceError::FieldNotFound {
                    pattern: parameter.idx_name.to_string(),
                    url: run.to_string(),
                });
            }
            Ok(Grid::new(vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 2.0, 3.0, 4.0]).unwrap())
        }
    }

    #[test]
    fn expands_levels_for_isobaric_variables() {
        let requests = warm_targets(
            datetime!(2024-05-12 14:00 UTC),
            2,
            &[Variable::Wind, Variable::Cape],
            &[850, 700],
        );
        // 3 hours x (2 wind levels + 1 cape)
        assert_eq!(requests.len(), 9);
        assert_eq!(requests[0].level, Some(850));
        assert_eq!(requests[2].variable, Variable::Cape);
        assert_eq!(requests[2].level, None);
        assert_eq!(requests[8].target, datetime!(2024-05-12 16:00 UTC));
    }

    #[tokio::test]
    async fn counts_failures_without_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let service = ForecastService::new(Arc::new(SurfaceOnly), ForecastCache::new(dir.path()), 2);

        let requests = warm_targets(
            datetime!(2024-05-12 12:00 UTC),
            0,
            &[Variable::Wind, Variable::Cape, Variable::Cin],
            &[850],
        );
        let report = warm_cache(&service, &requests).await;
        assert_eq!(report, WarmReport { ready: 2, failed: 1 });
    }
}
