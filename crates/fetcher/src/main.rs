use fetcher::{
    get_config_info, get_log_level, setup_logger, warm_cache, warm_targets, Cli, ForecastCache,
    ForecastService, GribFetcher, NoaaSource, RateLimiter,
};
use gfs_relay_core::create_dir_all;
use log::{error, info};
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::interval;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let log_level = get_log_level(cli.level.as_deref());
    setup_logger()
        .level(log_level)
        .level_for("fetcher", log_level)
        .apply()?;

    let variables = cli.variables()?;
    let cache_dir = cli.cache_dir();
    create_dir_all(&cache_dir)?;

    info!("GFS Fetcher starting...");
    info!("  Cache dir: {}", cache_dir);
    info!("  Mirrors: {}", cli.source_urls().join(", "));
    info!("  Fetch interval: {} seconds", cli.sleep_interval());
    info!(
        "  Variables: {}",
        variables
            .iter()
            .map(|v| v.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
        cli.token_capacity(),
        cli.refill_rate(),
    )));
    let fetcher = GribFetcher::new(&cli.user_agent(), rate_limiter)?;
    let service = ForecastService::new(
        Arc::new(NoaaSource::new(fetcher, cli.source_urls())),
        ForecastCache::new(cache_dir),
        cli.max_attempts(),
    );

    warm_periodically(cli, service).await;
    Ok(())
}

async fn warm_periodically(cli: Cli, service: ForecastService) {
    let sleep_between_checks = cli.sleep_interval();
    let levels = cli.levels();
    let variables = match cli.variables() {
        Ok(variables) => variables,
        Err(err) => {
            error!("invalid variable list: {}", err);
            return;
        }
    };

    let mut check_interval = interval(Duration::from_secs(sleep_between_checks));
    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                let requests = warm_targets(OffsetDateTime::now_utc(), cli.warm_hours(), &variables, &levels);
                info!("warming {} requests", requests.len());
                let report = warm_cache(&service, &requests).await;
                if report.failed > 0 {
                    error!("{} requests could not be warmed", report.failed);
                }
                info!("waiting {} seconds for next run", sleep_between_checks);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return;
            }
        }
    }
}
