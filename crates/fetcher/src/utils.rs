use clap::Parser;
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use gfs_relay_core::{
    default_source_urls, find_config_file, load_config, ConfigSource, DEFAULT_CACHE_DIR,
    DEFAULT_FETCH_INTERVAL, DEFAULT_MAX_ATTEMPTS,
};
use log::{debug, LevelFilter};
use reqwest::{header::RANGE, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::{
    env,
    sync::Arc,
    time::{Duration, Instant},
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};
use tokio::sync::Mutex;

use crate::{Variable, DEFAULT_ISOBARIC_LEVEL};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "GFS Fetcher - Keeps the relay cache warm with upcoming GFS fields"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $GFS_FETCHER_CONFIG, ./fetcher.toml,
    /// $XDG_CONFIG_HOME/gfs-relay/fetcher.toml, /etc/gfs-relay/fetcher.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "GFS_FETCHER_LEVEL")]
    pub level: Option<String>,

    /// Directory holding the converted JSON artifacts (shared with the relay)
    #[arg(short = 'd', long, env = "GFS_FETCHER_CACHE_DIR")]
    #[serde(alias = "data_dir")]
    pub cache_dir: Option<String>,

    /// Seconds between warm-up passes
    #[arg(short, long, env = "GFS_FETCHER_SLEEP_INTERVAL")]
    pub sleep_interval: Option<u64>,

    /// Hours ahead of now to warm on every pass
    #[arg(short, long, env = "GFS_FETCHER_WARM_HOURS")]
    pub warm_hours: Option<u16>,

    /// Variables to warm, comma separated (default: all)
    #[arg(long, env = "GFS_FETCHER_VARIABLES", value_delimiter = ',')]
    pub variables: Option<Vec<String>>,

    /// Pressure levels (hPa) to warm for isobaric variables, comma separated
    #[arg(long, env = "GFS_FETCHER_LEVELS", value_delimiter = ',')]
    pub levels: Option<Vec<u16>>,

    /// GFS mirrors tried in order, comma separated
    #[arg(long, env = "GFS_FETCHER_SOURCE_URLS", value_delimiter = ',')]
    pub source_urls: Option<Vec<String>>,

    /// Model runs tried per request before giving up
    #[arg(short, long, env = "GFS_FETCHER_MAX_ATTEMPTS")]
    pub max_attempts: Option<usize>,

    /// Rate limiter refill rate in requests per second
    #[arg(short, long, env = "GFS_FETCHER_REFILL_RATE")]
    pub refill_rate: Option<f64>,

    /// Rate limiter token capacity
    #[arg(short, long, env = "GFS_FETCHER_TOKEN_CAPACITY")]
    pub token_capacity: Option<usize>,

    /// HTTP User-Agent header for NOAA requests
    #[arg(short, long, env = "GFS_FETCHER_USER_AGENT")]
    pub user_agent: Option<String>,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn cache_dir(&self) -> String {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string())
    }

    /// Seconds between passes, at least 1 (a zero period would make the timer panic).
    pub fn sleep_interval(&self) -> u64 {
        self.sleep_interval.unwrap_or(DEFAULT_FETCH_INTERVAL).max(1)
    }

    pub fn warm_hours(&self) -> u16 {
        self.warm_hours.unwrap_or(6)
    }

    /// Configured variables; unknown names are an error so typos don't silently warm nothing.
    pub fn variables(&self) -> Result<Vec<Variable>, crate::VariableError> {
        match &self.variables {
            Some(names) => names.iter().map(|n| n.parse()).collect(),
            None => Ok(Variable::ALL.to_vec()),
        }
    }

    pub fn levels(&self) -> Vec<u16> {
        self.levels
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_ISOBARIC_LEVEL])
    }

    pub fn source_urls(&self) -> Vec<String> {
        self.source_urls.clone().unwrap_or_else(default_source_urls)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate.unwrap_or(2.0)
    }

    pub fn token_capacity(&self) -> usize {
        self.token_capacity.unwrap_or(10)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("gfs-fetcher/{}", env!("CARGO_PKG_VERSION")))
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("GFS_FETCHER_CONFIG", "fetcher.toml")
    };

    let file_config: Cli = load_config(&source).unwrap_or_else(|e| {
        eprintln!("ignoring config file {}: {:#}", source, e);
        Cli::default()
    });

    // CLI args override file config (env vars are handled by clap)
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        cache_dir: cli_args.cache_dir.or(file_config.cache_dir),
        sleep_interval: cli_args.sleep_interval.or(file_config.sleep_interval),
        warm_hours: cli_args.warm_hours.or(file_config.warm_hours),
        variables: cli_args.variables.or(file_config.variables),
        levels: cli_args.levels.or(file_config.levels),
        source_urls: cli_args.source_urls.or(file_config.source_urls),
        max_attempts: cli_args.max_attempts.or(file_config.max_attempts),
        refill_rate: cli_args.refill_rate.or(file_config.refill_rate),
        token_capacity: cli_args.token_capacity.or(file_config.token_capacity),
        user_agent: cli_args.user_agent.or(file_config.user_agent),
    }
}

pub fn get_log_level(level: Option<&str>) -> LevelFilter {
    let level_str = level
        .map(str::to_string)
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    match level_str.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub fn setup_logger() -> Dispatch {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                now,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
}

/// Token bucket shared by every request sent to the NOAA mirrors.
pub struct RateLimiter {
    capacity: usize,
    tokens: f64,
    last_refill: Instant,
    /// tokens per second
    refill_rate: f64,
}

impl RateLimiter {
    pub fn new(capacity: usize, refill_rate: f64) -> Self {
        RateLimiter {
            capacity,
            tokens: capacity as f64,
            last_refill: Instant::now(),
            refill_rate,
        }
    }

    fn refill_tokens(&mut self) {
        let now = Instant::now();
        let elapsed_time = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_time * self.refill_rate).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Take `tokens`, waiting for the bucket to refill up to three times.
    pub async fn try_acquire(&mut self, tokens: f64) -> bool {
        let mut retries = 0;

        loop {
            self.refill_tokens();

            if tokens <= self.tokens {
                self.tokens -= tokens;
                return true;
            }
            if retries >= 3 || self.refill_rate <= 0.0 {
                return false;
            }
            retries += 1;
            let wait = (tokens - self.tokens) / self.refill_rate;
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("rate limit exceeded after retries")]
    RateLimited,
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("error sending request to {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("error reading body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// HTTP access to the GFS mirrors: inventories as text, messages as byte ranges.
pub struct GribFetcher {
    client: ClientWithMiddleware,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GribFetcher {
    pub fn new(user_agent: &str, rate_limiter: Arc<Mutex<RateLimiter>>) -> Result<Self, FetchError> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(
            Client::builder()
                .user_agent(user_agent)
                .build()
                .map_err(FetchError::Client)?,
        )
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    async fn acquire(&self) -> Result<(), FetchError> {
        let mut limiter = self.rate_limiter.lock().await;
        if !limiter.try_acquire(1.0).await {
            return Err(FetchError::RateLimited);
        }
        Ok(())
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.acquire().await?;

        debug!("requesting: {}", url);
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        response.text().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })
    }

    /// Download part of a file; `range` is a full `Range` header value.
    pub async fn fetch_range(&self, url: &str, range: &str) -> Result<Vec<u8>, FetchError> {
        self.acquire().await?;

        debug!("requesting: {} ({})", url, range);
        let response = self
            .client
            .get(url)
            .header(RANGE, range)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}
