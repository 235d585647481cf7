use clap::Parser;
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use gfs_relay_core::{
    default_source_urls, find_config_file, load_config, ConfigSource, DEFAULT_CACHE_DIR,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RELAY_PORT,
};
use log::LevelFilter;
use std::env;
use time::{format_description::well_known::Iso8601, OffsetDateTime};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "GFS Relay - Serves GFS map layers to the browser extension"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $GFS_RELAY_CONFIG, ./relay.toml,
    /// $XDG_CONFIG_HOME/gfs-relay/relay.toml, /etc/gfs-relay/relay.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "GFS_RELAY_LEVEL")]
    pub level: Option<String>,

    /// Host to listen on (use 127.0.0.1 to keep it local)
    #[arg(short, long, env = "GFS_RELAY_HOST")]
    #[serde(alias = "host")]
    pub domain: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "GFS_RELAY_PORT")]
    pub port: Option<String>,

    /// Directory holding the converted JSON artifacts
    #[arg(long, env = "GFS_RELAY_CACHE_DIR")]
    #[serde(alias = "data_dir")]
    pub cache_dir: Option<String>,

    /// Origins allowed by CORS, comma separated (default: any)
    /// e.g. chrome-extension://<id>,moz-extension://<id>
    #[arg(long, env = "GFS_RELAY_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Option<Vec<String>>,

    /// GFS mirrors tried in order, comma separated
    #[arg(long, env = "GFS_RELAY_SOURCE_URLS", value_delimiter = ',')]
    pub source_urls: Option<Vec<String>>,

    /// Model runs tried per request before giving up
    #[arg(long, env = "GFS_RELAY_MAX_ATTEMPTS")]
    pub max_attempts: Option<usize>,

    /// Rate limiter refill rate in requests per second
    #[arg(long, env = "GFS_RELAY_REFILL_RATE")]
    pub refill_rate: Option<f64>,

    /// Rate limiter token capacity
    #[arg(long, env = "GFS_RELAY_TOKEN_CAPACITY")]
    pub token_capacity: Option<usize>,

    /// HTTP User-Agent header for NOAA requests
    #[arg(long, env = "GFS_RELAY_USER_AGENT")]
    pub user_agent: Option<String>,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn host(&self) -> String {
        self.domain
            .clone()
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn port(&self) -> String {
        self.port
            .clone()
            .unwrap_or_else(|| DEFAULT_RELAY_PORT.to_string())
    }

    pub fn cache_dir(&self) -> String {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string())
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins.clone().unwrap_or_default()
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
            .unwrap_or_else(|| format!("gfs-relay/{}", env!("CARGO_PKG_VERSION")))
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("GFS_RELAY_CONFIG", "relay.toml")
    };

    if let Some(path) = source.path() {
        log::info!("Loading config from: {}", path.display());
    }

    let file_config: Cli = load_config(&source).unwrap_or_else(|e| {
        eprintln!("ignoring config file {}: {:#}", source, e);
        Cli::default()
    });

    // CLI args override file config (env vars are handled by clap)
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        domain: cli_args.domain.or(file_config.domain),
        port: cli_args.port.or(file_config.port),
        cache_dir: cli_args.cache_dir.or(file_config.cache_dir),
        allowed_origins: cli_args.allowed_origins.or(file_config.allowed_origins),
        source_urls: cli_args.source_urls.or(file_config.source_urls),
        max_attempts: cli_args.max_attempts.or(file_config.max_attempts),
        refill_rate: cli_args.refill_rate.or(file_config.refill_rate),
        token_capacity: cli_args.token_capacity.or(file_config.token_capacity),
        user_agent: cli_args.user_agent.or(file_config.user_agent),
    }
}

pub fn get_log_level(cli: &Cli) -> LevelFilter {
    let level_str = cli
        .level
        .clone()
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
