use crate::helpers::{raw, spawn_app, spawn_app_with_origins, MockForecastAccess};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use fetcher::{Error, Level, Variable, VariableError};
use hyper::{header, Method};
use relay::ErrorResponse;
use std::sync::Arc;
use time::macros::datetime;
use tower::ServiceExt;

const WIND_RECORDS: &str = r#"[{"header":{"parameterNumber":2},"data":[1.5,null]},{"header":{"parameterNumber":3},"data":[0.5,null]}]"#;

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn wind_is_the_default_variable() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data
        .expect_variable_data()
        .withf(|req| {
            req.variable == Variable::Wind
                && req.level == Some(850)
                && req.target == datetime!(2024-05-12 14:00 UTC)
                && req.lat == Some(39.7)
        })
        .times(1)
        .returning(|_| Ok(raw(WIND_RECORDS)));

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post(
        "/api/get_gfs_data",
        r#"{"lat":39.7,"lon":-104.9,"date":"2024-05-12T14:00:00Z","level":850}"#,
    );

    let response = test_app
        .app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    // cached records are relayed without being re-encoded
    assert_eq!(
        body_text(response).await,
        format!(r#"{{"status":"success","message":{}}}"#, WIND_RECORDS)
    );
}

#[tokio::test]
async fn path_selects_the_variable() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data
        .expect_variable_data()
        .withf(|req| req.variable == Variable::Cape && req.level.is_none())
        .times(1)
        .returning(|_| Ok(raw(r#"[{"header":{},"data":[]}]"#)));

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post(
        "/api/get_gfs_data/cape",
        r#"{"date":"2024-05-12 14:00","level":null,"variable":"wind"}"#,
    );

    let response = test_app
        .app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn string_levels_are_accepted() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data
        .expect_variable_data()
        .withf(|req| req.variable == Variable::Vvel && req.level == Some(500))
        .times(1)
        .returning(|_| Ok(raw("[]")));

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post(
        "/api/get_gfs_data",
        r#"{"date":"2024-05-12","level":"500","variable":"vvel"}"#,
    );

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_date_is_rejected_before_fetching() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data.expect_variable_data().times(0);

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post("/api/get_gfs_data", r#"{"date":"tomorrow-ish"}"#);

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(error.status, "error");
    assert!(error.message.contains("tomorrow-ish"));
}

#[tokio::test]
async fn unknown_variable_is_rejected() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data.expect_variable_data().times(0);

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post("/api/get_gfs_data/humidity", r#"{"date":"2024-05-12"}"#);

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data.expect_variable_data().times(0);

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post("/api/get_gfs_data", r#"{"lat": 40"#);

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(error.status, "error");
}

#[tokio::test]
async fn unsupported_level_is_a_client_error() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data
        .expect_variable_data()
        .times(1)
        .returning(|req| {
            Err(Error::Variable(VariableError::UnsupportedLevel {
                variable: req.variable,
                level: 123,
            }))
        });

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post(
        "/api/get_gfs_data",
        r#"{"date":"2024-05-12T06:00:00","level":123}"#,
    );

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exhausted_fallback_is_a_generic_failure() {
    let mut forecast_data = MockForecastAccess::new();
    forecast_data
        .expect_variable_data()
        .times(1)
        .returning(|req| {
            Err(Error::Exhausted {
                variable: req.variable,
                level: Level::Surface,
                valid_time: req.target,
                attempts: 4,
            })
        });

    let test_app = spawn_app(Arc::new(forecast_data)).await;
    let request = post("/api/get_gfs_data/sfc_temp", r#"{"date":"2024-05-12T06:00:00Z"}"#);

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let error: ErrorResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(error.message, "Failed to fetch GFS data");
}

#[tokio::test]
async fn preflight_allows_any_origin_by_default() {
    let test_app = spawn_app(Arc::new(MockForecastAccess::new())).await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/get_gfs_data")
        .header(header::ORIGIN, "chrome-extension://abcdef")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = test_app.app.clone().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn preflight_echoes_configured_origin() {
    let origins = vec!["moz-extension://relay-map".to_string()];
    let test_app = spawn_app_with_origins(Arc::new(MockForecastAccess::new()), &origins).await;

    let allowed = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/get_gfs_data/wind")
        .header(header::ORIGIN, "moz-extension://relay-map")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = test_app.app.clone().oneshot(allowed).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "moz-extension://relay-map"
    );

    let other = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/get_gfs_data/wind")
        .header(header::ORIGIN, "https://elsewhere.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = test_app.app.clone().oneshot(other).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn docs_are_served() {
    let test_app = spawn_app(Arc::new(MockForecastAccess::new())).await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/docs")
        .body(Body::empty())
        .unwrap();

    let response = test_app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
