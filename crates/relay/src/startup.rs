use crate::{get_gfs_data, get_gfs_variable, routes, Cli, ForecastData};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::IntoResponse,
    routing::post,
    Router,
};
use fetcher::{ForecastCache, ForecastService, GribFetcher, NoaaSource, RateLimiter};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::info;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

#[derive(Clone)]
pub struct AppState {
    pub forecast_data: Arc<dyn ForecastData>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::gfs::get_gfs_data,
        routes::gfs::get_gfs_variable,
    ),
    components(
        schemas(
                routes::gfs::GfsDataRequest,
                routes::gfs::LevelArg,
                routes::gfs::GfsResponse,
                routes::gfs::ErrorResponse,
        )
    ),
    tags(
        (name = "gfs relay api", description = "serves GFS forecast grids as GRIB-style JSON records for map overlays")
    )
)]
struct ApiDoc;

pub fn build_app_state(cli: &Cli) -> Result<AppState, anyhow::Error> {
    let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
        cli.token_capacity(),
        cli.refill_rate(),
    )));
    let fetcher = GribFetcher::new(&cli.user_agent(), rate_limiter)
        .map_err(|e| anyhow!("error setting up http client: {}", e))?;
    let source = Arc::new(NoaaSource::new(fetcher, cli.source_urls()));
    let service = ForecastService::new(
        source,
        ForecastCache::new(cli.cache_dir()),
        cli.max_attempts(),
    );

    Ok(AppState {
        forecast_data: Arc::new(service),
    })
}

/// An empty list or `*` allows any origin.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

pub fn app(app_state: AppState, allowed_origins: &[String]) -> Router {
    let api_docs = ApiDoc::openapi();

    Router::new()
        .route("/api/get_gfs_data", post(get_gfs_data))
        .route("/api/get_gfs_data/{variable}", post(get_gfs_variable))
        .with_state(Arc::new(app_state))
        .layer(middleware::from_fn(log_request))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .merge(Scalar::with_url("/docs", api_docs))
        .layer(cors_layer(allowed_origins))
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default()
        .to_string();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}
