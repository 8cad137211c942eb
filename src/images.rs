//! Per-scene image generation.
//!
//! Each scene is submitted to the image service and polled until it reaches
//! a terminal state. Any failure for a scene (submission error, poll error,
//! failed prediction, missing output, attempts exhausted) substitutes a
//! placeholder URL for that scene only, so the output always has exactly one
//! asset per input scene, in order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::api::{ImageInput, ImageService, PredictionStatus};
use crate::model::{AssetSource, GeneratedAsset, Scene};
use crate::{logi, logok, logw};

pub const IMAGE_WIDTH: u32 = 1280;
pub const IMAGE_HEIGHT: u32 = 720;
const INFERENCE_STEPS: u32 = 50;
const GUIDANCE_SCALE: f32 = 7.5;

/// Sleeps between poll attempts. Injected so tests do not wait in real time.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

pub fn image_prompt(scene: &Scene, style: &str) -> String {
    format!("{}, {} style, cinematic, high quality", scene.visual_prompt, style)
}

pub fn image_input(scene: &Scene, style: &str) -> ImageInput {
    ImageInput {
        prompt: image_prompt(scene, style),
        width: IMAGE_WIDTH,
        height: IMAGE_HEIGHT,
        num_inference_steps: INFERENCE_STEPS,
        guidance_scale: GUIDANCE_SCALE,
    }
}

fn random_token() -> String {
    let token: u128 = rand::thread_rng().r#gen();
    format!("{token:032x}")
}

pub struct ImageGenerator {
    service: Option<Arc<dyn ImageService>>,
    pacer: Arc<dyn Pacer>,
    policy: PollPolicy,
    placeholder_base: String,
}

impl ImageGenerator {
    pub fn new(service: Arc<dyn ImageService>, pacer: Arc<dyn Pacer>, policy: PollPolicy) -> Self {
        Self {
            service: Some(service),
            pacer,
            policy,
            placeholder_base: "https://picsum.photos/1280/720".to_string(),
        }
    }

    /// A generator without an image service; every scene gets a placeholder.
    pub fn unconfigured() -> Self {
        Self {
            service: None,
            pacer: Arc::new(TokioPacer),
            policy: PollPolicy::default(),
            placeholder_base: "https://picsum.photos/1280/720".to_string(),
        }
    }

    pub fn with_placeholder_base(mut self, base: impl Into<String>) -> Self {
        self.placeholder_base = base.into();
        self
    }

    pub fn placeholder_url(&self) -> String {
        format!("{}?random={}", self.placeholder_base, random_token())
    }

    fn placeholder(&self, scene: &Scene, reason: String) -> GeneratedAsset {
        logw(format!(
            "Scene {} image replaced by placeholder: {}",
            scene.sequence_number, reason
        ));
        GeneratedAsset {
            scene_sequence_number: scene.sequence_number,
            image_url: self.placeholder_url(),
            source: AssetSource::Placeholder { reason },
        }
    }

    /// One asset per scene, in scene order.
    pub async fn generate(&self, scenes: &[Scene], style: &str) -> Vec<GeneratedAsset> {
        let mut assets = Vec::with_capacity(scenes.len());
        for scene in scenes {
            assets.push(self.generate_one(scene, style).await);
        }
        assets
    }

    async fn generate_one(&self, scene: &Scene, style: &str) -> GeneratedAsset {
        let Some(service) = self.service.as_ref() else {
            return self.placeholder(scene, "image service is not configured".to_string());
        };

        let input = image_input(scene, style);
        let prediction_id = match service.submit(&input).await {
            Ok(id) => id,
            Err(e) => return self.placeholder(scene, format!("submission failed: {e}")),
        };
        logi(format!(
            "Scene {} submitted as prediction {}",
            scene.sequence_number, prediction_id
        ));

        for attempt in 1..=self.policy.max_attempts {
            match service.status(&prediction_id).await {
                Ok(PredictionStatus::Succeeded(Some(url))) => {
                    logok(format!("Scene {} image ready: {}", scene.sequence_number, url));
                    return GeneratedAsset {
                        scene_sequence_number: scene.sequence_number,
                        image_url: url,
                        source: AssetSource::Generated,
                    };
                }
                Ok(PredictionStatus::Succeeded(None)) => {
                    return self.placeholder(scene, "prediction succeeded without output".into());
                }
                Ok(PredictionStatus::Failed(err)) => {
                    let detail = err.unwrap_or_else(|| "no detail".to_string());
                    return self.placeholder(scene, format!("prediction failed: {detail}"));
                }
                Ok(PredictionStatus::Pending(state)) => {
                    tracing::debug!(
                        prediction_id = %prediction_id,
                        attempt,
                        state = %state,
                        "prediction still running"
                    );
                }
                Err(e) => return self.placeholder(scene, format!("poll failed: {e}")),
            }

            if attempt < self.policy.max_attempts {
                self.pacer.pause(self.policy.interval).await;
            }
        }

        self.placeholder(
            scene,
            format!(
                "no terminal status after {} attempts",
                self.policy.max_attempts
            ),
        )
    }
}
