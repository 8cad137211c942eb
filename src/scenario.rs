use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::api::{CompletionRequest, TextCompletion};
use crate::model::{Generated, Scenario, Scene};
use crate::{logi, logw};

const MAX_DIARY_BYTES: usize = 20_000;
const MAX_OUTPUT_TOKENS: u32 = 1500;
const TEMPERATURE: f32 = 0.8;

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes;
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

fn system_prompt(emotion: &str) -> String {
    format!(
        "당신은 감정적인 영화 시나리오 작가입니다.\n\
         주어진 일기를 바탕으로 {emotion} 감정을 중심으로 한 감동적인 3분 영화 시나리오를 작성해주세요.\n\n\
         다음 JSON 형식으로 응답해주세요:\n\
         {{\n\
           \"title\": \"영화 제목\",\n\
           \"genre\": \"장르\",\n\
           \"scenes\": [\n\
             {{\"sceneNumber\": 1, \"description\": \"장면 설명\", \"narration\": \"나레이션\", \"visualPrompt\": \"이미지 생성용 프롬프트\"}},\n\
             {{\"sceneNumber\": 2, \"description\": \"장면 설명\", \"narration\": \"나레이션\", \"visualPrompt\": \"이미지 생성용 프롬프트\"}},\n\
             {{\"sceneNumber\": 3, \"description\": \"장면 설명\", \"narration\": \"나레이션\", \"visualPrompt\": \"이미지 생성용 프롬프트\"}}\n\
           ],\n\
           \"overallNarration\": \"전체 나레이션\"\n\
         }}"
    )
}

pub fn scenario_request(diary: &str, emotion: &str) -> CompletionRequest {
    let diary = trim_copy_utf8_safe(diary, MAX_DIARY_BYTES);
    CompletionRequest {
        system: system_prompt(emotion),
        user: format!("일기 내용: {diary}"),
        max_tokens: MAX_OUTPUT_TOKENS,
        temperature: TEMPERATURE,
    }
}

/// Canned three-scene scenario built from the emotion tag alone.
pub fn fallback_scenario(emotion: &str) -> Scenario {
    Scenario {
        title: format!("{emotion} 기반 영화"),
        genre: "AI 창작물".to_string(),
        scenes: vec![
            Scene::new(
                1,
                "오프닝",
                "새로운 이야기가 시작됩니다.",
                format!("{emotion} emotion opening scene"),
            ),
            Scene::new(
                2,
                "전개",
                "일상의 특별한 순간들.",
                format!("{emotion} daily life moment"),
            ),
            Scene::new(
                3,
                "마무리",
                "아름다운 결말입니다.",
                format!("{emotion} beautiful ending"),
            ),
        ],
        overall_narration: "당신의 일기가 만들어낸 특별한 이야기입니다.".to_string(),
    }
}

fn code_fence_regex() -> Result<&'static Regex> {
    static FENCE_RE: OnceCell<Regex> = OnceCell::new();
    FENCE_RE.get_or_try_init(|| {
        Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$")
            .context("failed to compile code fence regex")
    })
}

fn strip_code_fence(text: &str) -> &str {
    match code_fence_regex() {
        Ok(re) => re
            .captures(text)
            .and_then(|cap| cap.get(1))
            .map_or(text, |m| m.as_str()),
        Err(_) => text,
    }
}

/// Renumber scenes 1..N when the model left numbers out, started at zero or
/// repeated one.
fn normalize_sequence(scenes: &mut [Scene]) {
    let mut seen = HashSet::new();
    let valid = scenes
        .iter()
        .all(|s| s.sequence_number > 0 && seen.insert(s.sequence_number));
    if !valid {
        for (idx, scene) in scenes.iter_mut().enumerate() {
            scene.sequence_number = idx as u32 + 1;
        }
    }
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        let mut scenario: Scenario = serde_json::from_str(strip_code_fence(text))
            .with_context(|| "Failed to parse scenario JSON")?;
        if scenario.scenes.is_empty() {
            anyhow::bail!("scenario has no scenes");
        }
        if scenario.scenes.iter().any(|s| s.visual_prompt.trim().is_empty()) {
            anyhow::bail!("scenario scene without visual prompt");
        }
        normalize_sequence(&mut scenario.scenes);
        Ok(scenario)
    }
}

/// Turns a diary entry into a [`Scenario`]. Never fails: any problem with the
/// text service yields [`fallback_scenario`].
#[derive(Clone)]
pub struct ScenarioGenerator {
    client: Option<Arc<dyn TextCompletion>>,
}

impl ScenarioGenerator {
    pub fn new(client: Arc<dyn TextCompletion>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// A generator without a text service; always returns the fallback.
    pub fn unconfigured() -> Self {
        Self { client: None }
    }

    pub fn model_id(&self) -> Option<&str> {
        self.client.as_deref().map(|c| c.model())
    }

    pub async fn generate(&self, diary: &str, emotion: &str) -> Generated<Scenario> {
        let Some(client) = self.client.as_ref() else {
            return Generated::Fallback {
                value: fallback_scenario(emotion),
                reason: "text generation service is not configured".to_string(),
            };
        };

        let request = scenario_request(diary, emotion);
        let outcome = match client.complete(&request).await {
            Ok(text) => Scenario::from_json(&text).map_err(|e| format!("{e:#}")),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(scenario) => {
                logi(format!(
                    "Scenario received: \"{}\" ({} scenes)",
                    scenario.title,
                    scenario.scenes.len()
                ));
                Generated::Fresh(scenario)
            }
            Err(reason) => {
                logw(format!("Scenario generation failed, using fallback: {}", reason));
                Generated::Fallback {
                    value: fallback_scenario(emotion),
                    reason,
                }
            }
        }
    }
}
