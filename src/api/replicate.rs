//! Client for the Replicate predictions API.
//!
//! A prediction is created with `POST /v1/predictions` and then polled with
//! `GET /v1/predictions/{id}` until it reaches a terminal status.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::api::{ImageInput, ImageService, PredictionStatus};
use crate::error::ApiError;

const SERVICE: &str = "Replicate";
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct ReplicateClient {
    client: Client,
    api_token: String,
    model_version: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ReplicateClient {
    pub fn new(
        client: Client,
        api_token: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_token: api_token.into(),
            model_version: model_version.into(),
            base_url: "https://api.replicate.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.api_token)
    }

    async fn read_prediction(resp: reqwest::Response) -> Result<PredictionResponse, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: body.chars().take(800).collect(),
            });
        }
        resp.json::<PredictionResponse>()
            .await
            .map_err(|e| ApiError::Malformed {
                service: SERVICE,
                reason: e.to_string(),
            })
    }
}

/// `output` is usually a list of URLs, but some models return a single URL.
fn first_output_url(output: Option<&serde_json::Value>) -> Option<String> {
    match output? {
        serde_json::Value::String(url) if !url.is_empty() => Some(url.clone()),
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
            .map(str::to_string),
        _ => None,
    }
}

fn classify(prediction: &PredictionResponse) -> PredictionStatus {
    match prediction.status.as_str() {
        "succeeded" => PredictionStatus::Succeeded(first_output_url(prediction.output.as_ref())),
        "failed" | "canceled" => PredictionStatus::Failed(
            prediction
                .error
                .as_ref()
                .filter(|e| !e.is_null())
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string())),
        ),
        other => PredictionStatus::Pending(other.to_string()),
    }
}

#[async_trait]
impl ImageService for ReplicateClient {
    async fn submit(&self, input: &ImageInput) -> Result<String, ApiError> {
        let body = json!({
            "version": self.model_version,
            "input": input,
        });

        let resp = self
            .client
            .post(format!("{}/v1/predictions", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&body)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let prediction = Self::read_prediction(resp).await?;
        if prediction.id.is_empty() {
            return Err(ApiError::Malformed {
                service: SERVICE,
                reason: "prediction id missing".to_string(),
            });
        }
        Ok(prediction.id)
    }

    async fn status(&self, prediction_id: &str) -> Result<PredictionStatus, ApiError> {
        let resp = self
            .client
            .get(format!("{}/v1/predictions/{}", self.base_url, prediction_id))
            .header("Authorization", self.auth_header())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let prediction = Self::read_prediction(resp).await?;
        Ok(classify(&prediction))
    }
}
