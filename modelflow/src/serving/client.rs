//! Client for a running inference service.

use super::protocol::{ErrorResponse, HealthResponse, PredictRequest, PredictResponse};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// The request could not be built.
    #[error("Invalid prediction request: {0}")]
    InvalidRequest(String),

    /// The service could not be reached.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("Service returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the body, if any.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Builds one feature row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionRequest {
    inner: PredictRequest,
}

impl PredictionRequest {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a numeric feature; non-finite values are rejected.
    pub fn with(mut self, column: impl Into<String>, value: f64) -> Result<Self, PredictionError> {
        let column = column.into();
        let number = serde_json::Number::from_f64(value).ok_or_else(|| {
            PredictionError::InvalidRequest(format!("feature '{column}' is not finite"))
        })?;
        self.inner.features.insert(column, Value::Number(number));
        Ok(self)
    }

    /// Sets a categorical feature.
    #[must_use]
    pub fn with_category(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner
            .features
            .insert(column.into(), Value::String(value.into()));
        self
    }

    /// Parses `column=value`; numbers become numeric features.
    pub fn with_pair(self, pair: &str) -> Result<Self, PredictionError> {
        let (column, value) = pair.split_once('=').ok_or_else(|| {
            PredictionError::InvalidRequest(format!("expected column=value, got '{pair}'"))
        })?;
        match value.trim().parse::<f64>() {
            Ok(number) => self.with(column.trim(), number),
            Err(_) => Ok(self.with_category(column.trim(), value.trim())),
        }
    }

    /// The wire payload.
    #[must_use]
    pub fn payload(&self) -> &PredictRequest {
        &self.inner
    }
}

/// Calls `/predict` and `/health` on a service.
#[derive(Debug, Clone)]
pub struct Predictor {
    base_url: String,
    client: reqwest::Client,
}

impl Predictor {
    /// Creates a client for `base_url` (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: &str) -> Result<Self, PredictionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The service base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Scores one row.
    pub async fn predict(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictResponse, PredictionError> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(request.payload())
            .send()
            .await?;
        decode(response).await
    }

    /// Queries service health.
    pub async fn health(&self) -> Result<HealthResponse, PredictionError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PredictionError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        return Err(PredictionError::Status {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_str(&body).map_err(|e| PredictionError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_rejects_non_finite() {
        assert!(matches!(
            PredictionRequest::new().with("sqft", f64::NAN),
            Err(PredictionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_from_pairs() {
        let request = PredictionRequest::new()
            .with_pair("sqft=1500")
            .unwrap()
            .with_pair("city = north")
            .unwrap();
        assert_eq!(request.payload().features["sqft"], json!(1500.0));
        assert_eq!(request.payload().features["city"], json!("north"));
        assert!(PredictionRequest::new().with_pair("sqft").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let predictor = Predictor::new("http://127.0.0.1:1/").unwrap();
        assert_eq!(predictor.base_url(), "http://127.0.0.1:1");
        assert!(matches!(
            predictor.health().await,
            Err(PredictionError::Transport(_))
        ));
    }
}
