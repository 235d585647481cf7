use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use fetcher::{parse_request_date, Error, ForecastRequest, Variable};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;

/// Body sent by the map when it needs a layer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GfsDataRequest {
    /// Map centre, only logged
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// Valid time, ISO-8601 date or date-time (naive values are UTC)
    #[schema(example = "2024-05-12T14:00:00Z")]
    pub date: String,
    /// Pressure level in hPa for isobaric variables
    #[serde(default)]
    pub level: Option<LevelArg>,
    /// Variable name, defaults to wind
    #[serde(default)]
    pub variable: Option<String>,
}

/// The extension sends levels either as numbers or strings.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum LevelArg {
    Number(f64),
    Text(String),
}

impl LevelArg {
    /// Pressure in hPa; `None` means the variable's default level.
    pub fn hpa(&self) -> Result<Option<u16>, String> {
        match self {
            LevelArg::Number(n) => {
                if n.fract() == 0.0 && *n > 0.0 && *n <= f64::from(u16::MAX) {
                    Ok(Some(*n as u16))
                } else {
                    Err(format!("invalid level: {}", n))
                }
            }
            LevelArg::Text(raw) => {
                let text = raw.trim().to_lowercase();
                let text = text
                    .strip_suffix("hpa")
                    .or_else(|| text.strip_suffix("mb"))
                    .unwrap_or(&text)
                    .trim();
                if text.is_empty() || text == "surface" {
                    return Ok(None);
                }
                text.parse::<u16>()
                    .map(Some)
                    .map_err(|_| format!("invalid level: {}", raw))
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GfsResponse {
    #[schema(example = "success")]
    pub status: String,
    /// Array of GRIB-style records, exactly as cached
    #[schema(value_type = Object)]
    pub message: Box<RawValue>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "error")]
    pub status: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            status: "error".to_string(),
            message: message.into(),
        }),
    )
}

#[utoipa::path(
    post,
    path = "/api/get_gfs_data",
    request_body = GfsDataRequest,
    responses(
        (status = OK, description = "GFS records for the requested variable", body = GfsResponse),
        (status = BAD_REQUEST, description = "Invalid date, variable or level", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to fetch GFS data", body = ErrorResponse)
    ))]
pub async fn get_gfs_data(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GfsDataRequest>, JsonRejection>,
) -> Result<Json<GfsResponse>, ApiError> {
    let Json(body) = body.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let variable = body.variable.clone();
    serve_variable(&state, body, variable.as_deref()).await
}

#[utoipa::path(
    post,
    path = "/api/get_gfs_data/{variable}",
    params(
         ("variable" = String, Path, description = "wind, precip, cloud, refc, sfc_temp, vvel, cape, cin or divergence"),
    ),
    request_body = GfsDataRequest,
    responses(
        (status = OK, description = "GFS records for the requested variable", body = GfsResponse),
        (status = BAD_REQUEST, description = "Invalid date, variable or level", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to fetch GFS data", body = ErrorResponse)
    ))]
pub async fn get_gfs_variable(
    State(state): State<Arc<AppState>>,
    Path(variable): Path<String>,
    body: Result<Json<GfsDataRequest>, JsonRejection>,
) -> Result<Json<GfsResponse>, ApiError> {
    let Json(body) = body.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    serve_variable(&state, body, Some(&variable)).await
}

async fn serve_variable(
    state: &AppState,
    body: GfsDataRequest,
    variable: Option<&str>,
) -> Result<Json<GfsResponse>, ApiError> {
    let req = to_forecast_request(body, variable).map_err(|message| {
        warn!("rejected request: {}", message);
        api_error(StatusCode::BAD_REQUEST, message)
    })?;

    let message = state
        .forecast_data
        .variable_data(&req)
        .await
        .map_err(|err| match err {
            Error::Variable(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
            other => {
                error!("error fetching {} for {}: {}", req.variable, req.target, other);
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch GFS data")
            }
        })?;

    Ok(Json(GfsResponse {
        status: "success".to_string(),
        message,
    }))
}

fn to_forecast_request(
    body: GfsDataRequest,
    variable: Option<&str>,
) -> Result<ForecastRequest, String> {
    let target = parse_request_date(&body.date).map_err(|e| e.to_string())?;
    let variable = match variable {
        Some(name) => name.parse::<Variable>().map_err(|e| e.to_string())?,
        None => Variable::Wind,
    };
    let level = match &body.level {
        Some(level) => level.hpa()?,
        None => None,
    };

    Ok(ForecastRequest {
        target,
        variable,
        level,
        lat: body.lat,
        lon: body.lon,
    })
}
