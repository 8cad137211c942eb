#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use diary_movie::api::{CompletionRequest, ImageInput, ImageService, PredictionStatus, TextCompletion};
use diary_movie::error::{ApiError, ComposeError, StoreError};
use diary_movie::images::{ImageGenerator, Pacer, PollPolicy};
use diary_movie::model::{GeneratedAsset, MovieRecord, ProgressEvent};
use diary_movie::registry::ProgressReceiver;
use diary_movie::scenario::ScenarioGenerator;
use diary_movie::store::{MemoryStore, MovieStore};
use diary_movie::video::{PlaceholderCompositor, VideoCompositor};
use diary_movie::{ConnectionRegistry, Services};

pub const PLACEHOLDER_PREFIX: &str = "https://picsum.photos/1280/720?random=";

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

pub fn scenario_json() -> String {
    json!({
        "title": "바다로 간 하루",
        "genre": "드라마",
        "scenes": [
            {"sceneNumber": 1, "description": "아침", "narration": "하루가 시작된다.", "visualPrompt": "sunrise over the sea"},
            {"sceneNumber": 2, "description": "점심", "narration": "친구를 만났다.", "visualPrompt": "friends laughing at a cafe"},
            {"sceneNumber": 3, "description": "저녁", "narration": "노을이 진다.", "visualPrompt": "sunset on the beach"}
        ],
        "overallNarration": "평범하지만 특별한 하루."
    })
    .to_string()
}

pub enum TextScript {
    Reply(String),
    TransportError,
}

pub struct FakeText {
    script: TextScript,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeText {
    pub fn replying(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            script: TextScript::Reply(text.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: TextScript::TransportError,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextCompletion for FakeText {
    fn model(&self) -> &str {
        "gpt-4"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.script {
            TextScript::Reply(text) => Ok(text.clone()),
            TextScript::TransportError => Err(ApiError::Status {
                service: "OpenAI",
                status: 503,
                body: "upstream unavailable".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Image generation
// ---------------------------------------------------------------------------

/// What the fake image service does for the n-th submitted scene.
#[derive(Clone, Debug)]
pub enum SceneScript {
    /// Pending for `polls` checks, then succeeds with `url`.
    Succeed { polls: u32, url: String },
    /// Reports `failed` on the first poll.
    Fail,
    /// Submission itself is rejected.
    RejectSubmit,
    /// Poll request errors.
    PollError,
    /// Never leaves the pending state.
    Hang,
}

pub fn succeed(url: &str) -> SceneScript {
    SceneScript::Succeed {
        polls: 0,
        url: url.to_string(),
    }
}

pub struct FakeImages {
    scripts: Vec<SceneScript>,
    submitted: Mutex<Vec<ImageInput>>,
    polls: Mutex<HashMap<usize, u32>>,
}

impl FakeImages {
    pub fn new(scripts: Vec<SceneScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            submitted: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
        })
    }

    pub fn submitted(&self) -> Vec<ImageInput> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn poll_count(&self, scene_index: usize) -> u32 {
        self.polls
            .lock()
            .unwrap()
            .get(&scene_index)
            .copied()
            .unwrap_or(0)
    }

    fn script(&self, index: usize) -> SceneScript {
        self.scripts.get(index).cloned().unwrap_or(SceneScript::Fail)
    }
}

fn index_of(prediction_id: &str) -> usize {
    prediction_id
        .trim_start_matches("pred-")
        .parse()
        .expect("fake prediction id")
}

#[async_trait]
impl ImageService for FakeImages {
    async fn submit(&self, input: &ImageInput) -> Result<String, ApiError> {
        let index = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(input.clone());
            submitted.len() - 1
        };
        match self.script(index) {
            SceneScript::RejectSubmit => Err(ApiError::Status {
                service: "Replicate",
                status: 422,
                body: "invalid input".into(),
            }),
            _ => Ok(format!("pred-{index}")),
        }
    }

    async fn status(&self, prediction_id: &str) -> Result<PredictionStatus, ApiError> {
        let index = index_of(prediction_id);
        let seen = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(index).or_insert(0);
            *count += 1;
            *count
        };
        match self.script(index) {
            SceneScript::Succeed { polls, url } if seen > polls => {
                Ok(PredictionStatus::Succeeded(Some(url)))
            }
            SceneScript::Succeed { .. } | SceneScript::Hang => {
                Ok(PredictionStatus::Pending("processing".into()))
            }
            SceneScript::Fail => Ok(PredictionStatus::Failed(Some("model error".into()))),
            SceneScript::PollError => Err(ApiError::Malformed {
                service: "Replicate",
                reason: "truncated body".into(),
            }),
            SceneScript::RejectSubmit => unreachable!("rejected submissions are never polled"),
        }
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingPacer {
    pub pauses: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

pub fn image_generator(images: Arc<FakeImages>, pacer: Arc<RecordingPacer>) -> ImageGenerator {
    ImageGenerator::new(
        images,
        pacer,
        PollPolicy {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        },
    )
}

// ---------------------------------------------------------------------------
// Store and compositor
// ---------------------------------------------------------------------------

/// Wraps a [`MemoryStore`] and fails the first `fail_first` updates.
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_first: usize,
    pub attempts: Mutex<Vec<MovieRecord>>,
}

impl FlakyStore {
    pub fn new(fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_first,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<MovieRecord> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MovieStore for FlakyStore {
    async fn update(&self, job_id: &str, record: &MovieRecord) -> Result<(), StoreError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(record.clone());
            attempts.len()
        };
        if attempt <= self.fail_first {
            return Err(StoreError::Unavailable("database connection reset".into()));
        }
        self.inner.update(job_id, record).await
    }
}

/// Compositor that never returns.
pub struct StuckCompositor;

#[async_trait]
impl VideoCompositor for StuckCompositor {
    async fn compose(
        &self,
        _assets: &[GeneratedAsset],
        _narration: &str,
        _music_style: &str,
    ) -> Result<String, ComposeError> {
        std::future::pending::<Result<String, ComposeError>>().await
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub registry: Arc<ConnectionRegistry>,
    pub pacer: Arc<RecordingPacer>,
}

pub fn services(
    text: Arc<dyn TextCompletion>,
    images: Arc<FakeImages>,
    store: Arc<dyn MovieStore>,
) -> (Services, Harness) {
    let registry = Arc::new(ConnectionRegistry::new());
    let pacer = Arc::new(RecordingPacer::default());
    let services = Services {
        scenarios: ScenarioGenerator::new(text),
        images: image_generator(images, Arc::clone(&pacer)),
        compositor: Arc::new(PlaceholderCompositor::new("https://storage.test/videos")),
        store,
        registry: Arc::clone(&registry),
        compose_timeout: Duration::from_secs(120),
    };
    (services, Harness { registry, pacer })
}

pub fn all_succeed() -> Arc<FakeImages> {
    FakeImages::new(vec![
        succeed("https://img.test/1.png"),
        succeed("https://img.test/2.png"),
        succeed("https://img.test/3.png"),
    ])
}

/// Drain every event currently queued on `rx`.
pub fn drain(rx: &mut ProgressReceiver) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
