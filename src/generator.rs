//! Job orchestration: scenario, images, video, persistence.
//!
//! Each submitted job runs on its own task through the four stages in strict
//! order, reporting a fixed progress checkpoint after each one. Scenario and
//! image failures are absorbed inside their stages; everything else is a
//! [`PipelineError`] handled once in [`Orchestrator::run`], which reports `-1`
//! and writes a failed record.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::{JoinError, JoinHandle};

use crate::api::{OpenAiClient, ReplicateClient};
use crate::config::Config;
use crate::error::{PipelineError, SubmitError};
use crate::images::{ImageGenerator, PollPolicy, TokioPacer};
use crate::model::{
    CompletionPayload, GeneratedAsset, Generated, Job, JobStatus, MovieRecord, ProgressEvent,
    Scenario,
};
use crate::registry::ConnectionRegistry;
use crate::scenario::ScenarioGenerator;
use crate::store::{JsonDirStore, MovieStore, SupabaseStore};
use crate::video::{PlaceholderCompositor, VideoCompositor};
use crate::{logi, logok, logw};

pub const CHECKPOINT_SCENARIO: i32 = 20;
pub const CHECKPOINT_IMAGES: i32 = 40;
pub const CHECKPOINT_VIDEO: i32 = 70;
pub const CHECKPOINT_SAVE: i32 = 90;
pub const CHECKPOINT_DONE: i32 = 100;

const STATUS_SCENARIO: &str = "🎬 AI가 시나리오를 작성하고 있어요...";
const STATUS_IMAGES: &str = "🎨 장면 이미지를 생성하고 있어요...";
const STATUS_VIDEO: &str = "🎞️ 영상을 편집하고 있어요...";
const STATUS_SAVE: &str = "💾 최종 저장 중이에요...";
const STATUS_DONE: &str = "🎉 영화가 완성되었어요!";
const STATUS_FAILED_PREFIX: &str = "❌ 생성 실패: ";

/// Collaborators used by every job.
pub struct Services {
    pub scenarios: ScenarioGenerator,
    pub images: ImageGenerator,
    pub compositor: Arc<dyn VideoCompositor>,
    pub store: Arc<dyn MovieStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub compose_timeout: Duration,
}

impl Services {
    /// Wire the production collaborators. Services without credentials are
    /// left unconfigured and fall back; without Supabase credentials records
    /// go to the local JSON directory store.
    pub fn from_config(config: &Config, registry: Arc<ConnectionRegistry>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        let scenarios = match &config.openai_key {
            Some(key) => ScenarioGenerator::new(Arc::new(
                OpenAiClient::new(client.clone(), key, &config.openai_model)
                    .with_base_url(&config.openai_base_url),
            )),
            None => {
                logw("OPENAI_API_KEY not set; every scenario will use the fallback.");
                ScenarioGenerator::unconfigured()
            }
        };

        let images = match &config.replicate_token {
            Some(token) => ImageGenerator::new(
                Arc::new(
                    ReplicateClient::new(client.clone(), token, &config.replicate_model_version)
                        .with_base_url(&config.replicate_base_url),
                ),
                Arc::new(TokioPacer),
                PollPolicy {
                    interval: config.poll_interval(),
                    max_attempts: config.poll_max_attempts,
                },
            ),
            None => {
                logw("REPLICATE_API_TOKEN not set; every scene will use a placeholder image.");
                ImageGenerator::unconfigured()
            }
        }
        .with_placeholder_base(&config.placeholder_image_base);

        let store: Arc<dyn MovieStore> = match (&config.supabase_url, &config.supabase_key) {
            (Some(url), Some(key)) => Arc::new(SupabaseStore::new(
                client.clone(),
                url,
                key,
                &config.supabase_table,
            )),
            _ => {
                logi(format!(
                    "Supabase not configured; storing records in {}",
                    config.data_dir.display()
                ));
                Arc::new(JsonDirStore::new(&config.data_dir))
            }
        };

        Ok(Self {
            scenarios,
            images,
            compositor: Arc::new(PlaceholderCompositor::new(&config.video_base_url)),
            store,
            registry,
            compose_timeout: config.compose_timeout(),
        })
    }
}

/// What a successful job produced.
#[derive(Debug, Clone)]
pub struct MovieSummary {
    pub scenario: Generated<Scenario>,
    pub assets: Vec<GeneratedAsset>,
    pub video_url: String,
}

/// Terminal result of one job. `status` is the job's own final status.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub summary: Option<MovieSummary>,
    pub error: Option<String>,
}

/// Handle to a spawned job; await it to get the [`JobOutcome`].
pub struct JobHandle {
    job_id: String,
    handle: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn wait(self) -> Result<JobOutcome, JoinError> {
        self.handle.await
    }
}

// Removes the id from the in-flight set when the job task ends, even if it
// panics.
struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    services: Arc<Services>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Orchestrator {
    pub fn new(services: Services) -> Self {
        Self {
            services: Arc::new(services),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.services.registry
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(job_id)
    }

    pub fn validate(job: &Job) -> Result<(), SubmitError> {
        if job.id.trim().is_empty() {
            return Err(SubmitError::Validation("movieId must not be empty".into()));
        }
        if job.diary_text.trim().is_empty() {
            return Err(SubmitError::Validation("diary must not be empty".into()));
        }
        if job.status() != JobStatus::Pending {
            return Err(SubmitError::Validation(format!(
                "movie {} is already {}",
                job.id,
                job.status().as_str()
            )));
        }
        Ok(())
    }

    /// Validate and start `job` on its own task. Returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, job: Job) -> Result<JobHandle, SubmitError> {
        Self::validate(&job)?;

        let guard = {
            let mut ids = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !ids.insert(job.id.clone()) {
                return Err(SubmitError::Duplicate(job.id));
            }
            InFlightGuard {
                ids: Arc::clone(&self.in_flight),
                job_id: job.id.clone(),
            }
        };

        let job_id = job.id.clone();
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.run(job).await
        });

        tracing::info!(job_id = %job_id, "movie generation submitted");
        Ok(JobHandle { job_id, handle })
    }

    async fn notify(&self, event: ProgressEvent) {
        let job_id = event.job_id.clone();
        self.services.registry.notify(&job_id, event).await;
    }

    async fn checkpoint(&self, job_id: &str, progress: i32, status: &str) {
        tracing::debug!(job_id = %job_id, progress, "checkpoint");
        self.notify(ProgressEvent::progress(job_id, progress, status))
            .await;
    }

    /// Run `job` to a terminal state on the current task. This is the single
    /// place pipeline errors are handled.
    pub async fn run(&self, mut job: Job) -> JobOutcome {
        let job_id = job.id.clone();
        if job.status().is_terminal() {
            logw(format!("Movie {} is already {}", job_id, job.status().as_str()));
            return JobOutcome {
                job_id,
                status: job.status(),
                summary: None,
                error: Some("job already finished".to_string()),
            };
        }
        logi(format!("=== Generating movie {} ===", job_id));

        match self.execute(&mut job).await {
            Ok(summary) => {
                logok(format!("DONE: {} -> {}", job_id, summary.video_url));
                JobOutcome {
                    job_id,
                    status: job.status(),
                    summary: Some(summary),
                    error: None,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(job_id = %job_id, error = %message, "movie generation failed");

                self.notify(ProgressEvent::failed(
                    &job_id,
                    format!("{STATUS_FAILED_PREFIX}{message}"),
                ))
                .await;

                if let Err(transition) = job.advance(JobStatus::Failed) {
                    tracing::warn!(job_id = %job_id, error = %transition, "job not marked failed");
                }

                let record = MovieRecord::failed(&job_id, &message, Utc::now());
                if let Err(store_err) = self.services.store.update(&job_id, &record).await {
                    tracing::error!(
                        job_id = %job_id,
                        error = %store_err,
                        "failed to persist failed status"
                    );
                }

                JobOutcome {
                    job_id,
                    status: job.status(),
                    summary: None,
                    error: Some(message),
                }
            }
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<MovieSummary, PipelineError> {
        let services = &self.services;
        job.advance(JobStatus::Processing)?;
        let job_id = job.id.clone();

        self.checkpoint(&job_id, CHECKPOINT_SCENARIO, STATUS_SCENARIO)
            .await;
        let scenario = services
            .scenarios
            .generate(&job.diary_text, &job.emotion_tag)
            .await;
        if let Generated::Fallback { reason, .. } = &scenario {
            tracing::warn!(job_id = %job_id, reason = %reason, "scenario fallback applied");
        }

        self.checkpoint(&job_id, CHECKPOINT_IMAGES, STATUS_IMAGES)
            .await;
        let assets = services
            .images
            .generate(&scenario.value().scenes, &job.visual_style)
            .await;
        let placeholders = assets.iter().filter(|a| a.is_placeholder()).count();
        if placeholders > 0 {
            tracing::warn!(
                job_id = %job_id,
                placeholders,
                total = assets.len(),
                "scene images replaced by placeholders"
            );
        }

        self.checkpoint(&job_id, CHECKPOINT_VIDEO, STATUS_VIDEO)
            .await;
        let compose = services.compositor.compose(
            &assets,
            &scenario.value().overall_narration,
            &job.music_style,
        );
        let video_url = tokio::time::timeout(services.compose_timeout, compose)
            .await
            .map_err(|_| PipelineError::ComposeTimeout(services.compose_timeout.as_secs()))??;

        self.checkpoint(&job_id, CHECKPOINT_SAVE, STATUS_SAVE)
            .await;
        let ai_model = services.scenarios.model_id().unwrap_or("unconfigured");
        let mut record = MovieRecord::completed(
            job,
            scenario.value(),
            &assets,
            video_url.clone(),
            ai_model,
            Utc::now(),
        );
        if let Some(meta) = record.metadata.as_object_mut() {
            let source = if scenario.is_fallback() { "fallback" } else { "model" };
            meta.insert("scenario_source".into(), source.into());
        }
        services.store.update(&job_id, &record).await?;
        job.advance(JobStatus::Completed)?;

        self.checkpoint(&job_id, CHECKPOINT_DONE, STATUS_DONE).await;
        let payload = CompletionPayload {
            video_url: video_url.clone(),
            thumbnail_url: record.thumbnail_url.clone(),
            title: scenario.value().title.clone(),
            genre: scenario.value().genre.clone(),
        };
        self.notify(ProgressEvent::completed(&job_id, STATUS_DONE, payload))
            .await;

        Ok(MovieSummary {
            scenario,
            assets,
            video_url,
        })
    }
}
