//! Domain types shared by the pipeline stages, the record store and the
//! progress channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::PipelineError;

/// Lifecycle of a movie job. Transitions only move forward:
/// `Pending -> Processing -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Submission body as sent by the web client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieRequest {
    pub movie_id: String,
    pub diary: String,
    pub emotion: String,
    pub style: String,
    pub music: String,
    #[serde(default)]
    pub length: String,
    #[serde(default)]
    pub user_id: String,
}

/// One end-to-end request to turn a diary entry into a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub diary_text: String,
    pub emotion_tag: String,
    pub visual_style: String,
    pub music_style: String,
    pub target_length: String,
    pub owner_id: String,
    status: JobStatus,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        diary_text: impl Into<String>,
        emotion_tag: impl Into<String>,
        visual_style: impl Into<String>,
        music_style: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            diary_text: diary_text.into(),
            emotion_tag: emotion_tag.into(),
            visual_style: visual_style.into(),
            music_style: music_style.into(),
            target_length: String::new(),
            owner_id: String::new(),
            status: JobStatus::Pending,
        }
    }

    pub fn with_target_length(mut self, length: impl Into<String>) -> Self {
        self.target_length = length.into();
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move the job forward. Backward moves and moves out of a terminal state
    /// are rejected and leave the status untouched.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

impl From<MovieRequest> for Job {
    fn from(req: MovieRequest) -> Self {
        Job::new(req.movie_id, req.diary, req.emotion, req.style, req.music)
            .with_target_length(req.length)
            .with_owner(req.user_id)
    }
}

/// One beat of the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "sceneNumber", default)]
    pub sequence_number: u32,
    pub description: String,
    #[serde(rename = "narration")]
    pub narration_line: String,
    #[serde(rename = "visualPrompt")]
    pub visual_prompt: String,
}

impl Scene {
    pub fn new(
        sequence_number: u32,
        description: impl Into<String>,
        narration_line: impl Into<String>,
        visual_prompt: impl Into<String>,
    ) -> Self {
        Self {
            sequence_number,
            description: description.into(),
            narration_line: narration_line.into(),
            visual_prompt: visual_prompt.into(),
        }
    }
}

/// Structured narrative plan produced once per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    pub genre: String,
    pub scenes: Vec<Scene>,
    #[serde(rename = "overallNarration")]
    pub overall_narration: String,
}

/// Result of a stage that substitutes a deterministic value on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated<T> {
    Fresh(T),
    Fallback { value: T, reason: String },
}

impl<T> Generated<T> {
    pub fn value(&self) -> &T {
        match self {
            Generated::Fresh(value) | Generated::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Generated::Fresh(value) | Generated::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Generated::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Generated,
    Placeholder { reason: String },
}

/// The image produced (or substituted) for one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAsset {
    pub scene_sequence_number: u32,
    pub image_url: String,
    pub source: AssetSource,
}

impl GeneratedAsset {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.source, AssetSource::Placeholder { .. })
    }
}

/// Terminal record written to the store. Optional fields that are `None`
/// are left out of the update so a failed write only touches `status` and
/// `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    #[serde(skip)]
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenes: Option<Vec<Scene>>,
    pub metadata: serde_json::Value,
}

impl MovieRecord {
    pub fn completed(
        job: &Job,
        scenario: &Scenario,
        assets: &[GeneratedAsset],
        video_url: String,
        ai_model: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            status: JobStatus::Completed,
            video_url: Some(video_url),
            thumbnail_url: assets.first().map(|a| a.image_url.clone()),
            genre: Some(scenario.genre.clone()),
            scenes: Some(scenario.scenes.clone()),
            metadata: json!({
                "generation_completed_at": at.to_rfc3339(),
                "ai_model": ai_model,
                "style": job.visual_style,
                "music": job.music_style,
            }),
        }
    }

    pub fn failed(job_id: &str, error: &str, at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Failed,
            video_url: None,
            thumbnail_url: None,
            genre: None,
            scenes: None,
            metadata: json!({
                "error": error,
                "failed_at": at.to_rfc3339(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Progress,
    Completed,
    Failed,
}

/// Payload carried only by the final completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub title: String,
    pub genre: String,
}

/// Transient progress notification pushed to the job's viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    #[serde(rename = "movieId")]
    pub job_id: String,
    pub progress: i32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<CompletionPayload>,
}

/// Progress value reported when a job has failed.
pub const FAILED_PROGRESS: i32 = -1;

impl ProgressEvent {
    pub fn progress(job_id: &str, progress: i32, status: impl Into<String>) -> Self {
        Self {
            kind: ProgressKind::Progress,
            job_id: job_id.to_string(),
            progress,
            status: status.into(),
            result: None,
        }
    }

    pub fn completed(job_id: &str, status: impl Into<String>, payload: CompletionPayload) -> Self {
        Self {
            kind: ProgressKind::Completed,
            job_id: job_id.to_string(),
            progress: 100,
            status: status.into(),
            result: Some(payload),
        }
    }

    pub fn failed(job_id: &str, status: impl Into<String>) -> Self {
        Self {
            kind: ProgressKind::Failed,
            job_id: job_id.to_string(),
            progress: FAILED_PROGRESS,
            status: status.into(),
            result: None,
        }
    }
}
