use async_trait::async_trait;
use axum::Router;
use fetcher::{Error, ForecastRequest};
use mockall::mock;
use relay::{app, AppState, ForecastData};
use serde_json::value::RawValue;
use std::sync::Arc;

mock! {
    pub ForecastAccess {}

    #[async_trait]
    impl ForecastData for ForecastAccess {
        async fn variable_data(&self, req: &ForecastRequest) -> Result<Box<RawValue>, Error>;
    }
}

pub struct TestApp {
    pub app: Router,
}

pub async fn spawn_app(forecast_data: Arc<dyn ForecastData>) -> TestApp {
    spawn_app_with_origins(forecast_data, &[]).await
}

pub async fn spawn_app_with_origins(
    forecast_data: Arc<dyn ForecastData>,
    allowed_origins: &[String],
) -> TestApp {
    let app_state = AppState { forecast_data };
    TestApp {
        app: app(app_state, allowed_origins),
    }
}

pub fn raw(json: &str) -> Box<RawValue> {
    RawValue::from_string(json.to_string()).unwrap()
}
