use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::message::OutgoingMessage;
use crate::recipients::Recipient;

/// Forecast provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait WeatherApi: Send + Sync {
    async fn fetch_forecast(&self, zip: &str, days: u8, include_alerts: bool) -> Result<Value, AppError>;
}

/// Hosted text-generation provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LlmApi: Send + Sync {
    /// Generate the prediction text for a prompt.
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;

    /// Ask whether `text` predicts at least `threshold` percent chance of a snow day.
    async fn classify(&self, text: &str, threshold: u8) -> Result<bool, AppError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait RecipientSource: Send + Sync {
    async fn fetch_recipients(&self) -> Result<Vec<Recipient>, AppError>;
}

/// One open connection to the outbound mail transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait Transport: Send {
    async fn send(&mut self, message: &OutgoingMessage) -> Result<(), AppError>;

    /// Round-trip a no-op and return the server's reply code.
    async fn probe_health(&mut self) -> Result<u16, AppError>;

    async fn close(&mut self) -> Result<(), AppError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait TransportFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, AppError>;
}

/// Where the latest prediction is kept for history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait PredictionStore: Send + Sync {
    async fn record(&self, prediction: &str) -> Result<(), AppError>;
}
