use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ComposeError;
use crate::model::GeneratedAsset;

/// Turns the ordered scene images, the narration and a music choice into a
/// single playable video URL. Implementations must return in bounded time;
/// the orchestrator also wraps the call in a timeout.
#[async_trait]
pub trait VideoCompositor: Send + Sync {
    async fn compose(
        &self,
        assets: &[GeneratedAsset],
        narration: &str,
        music_style: &str,
    ) -> Result<String, ComposeError>;
}

/// Returns a fresh URL under `base_url` without rendering anything.
pub struct PlaceholderCompositor {
    base_url: String,
}

impl PlaceholderCompositor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl VideoCompositor for PlaceholderCompositor {
    async fn compose(
        &self,
        assets: &[GeneratedAsset],
        _narration: &str,
        music_style: &str,
    ) -> Result<String, ComposeError> {
        let video_id = Uuid::new_v4();
        tracing::debug!(
            frames = assets.len(),
            music = %music_style,
            %video_id,
            "placeholder video composed"
        );
        Ok(format!("{}/{}.mp4", self.base_url, video_id))
    }
}
