//! Clients for the external AI services, each behind a small trait so the
//! pipeline can be driven by test doubles.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ApiError;

pub mod openai;
pub mod replicate;

pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;

/// A single chat-style completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text-generation service returning the raw content of the first choice.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError>;
}

/// Model input for one image prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInput {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
}

/// Observed state of a submitted prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionStatus {
    /// Queued or still running.
    Pending(String),
    /// Finished; first output URL if the service returned one.
    Succeeded(Option<String>),
    /// Failed or canceled, with the service's error text when present.
    Failed(Option<String>),
}

/// Async image-generation service: submit a job, then poll it.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Returns the prediction id.
    async fn submit(&self, input: &ImageInput) -> Result<String, ApiError>;

    async fn status(&self, prediction_id: &str) -> Result<PredictionStatus, ApiError>;
}
