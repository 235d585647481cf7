use async_trait::async_trait;
use fetcher::{Error, ForecastRequest, ForecastService};
use serde_json::value::RawValue;

#[async_trait]
pub trait ForecastData: Send + Sync {
    /// Cached (or freshly converted) records for a request, as raw JSON.
    async fn variable_data(&self, req: &ForecastRequest) -> Result<Box<RawValue>, Error>;
}

#[async_trait]
impl ForecastData for ForecastService {
    async fn variable_data(&self, req: &ForecastRequest) -> Result<Box<RawValue>, Error> {
        self.get_variable(req).await
    }
}
