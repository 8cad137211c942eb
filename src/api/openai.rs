use crate::api::{CompletionRequest, TextCompletion};
use crate::error::ApiError;
use crate::logw;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "OpenAI";
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

fn openai_extract_message_content(resp_json: &str) -> Result<String, String> {
    let root: serde_json::Value =
        serde_json::from_str(resp_json).map_err(|e| format!("body is not JSON: {e}"))?;

    if let Some(err) = root.get("error") {
        let msg = err
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        if let Some(typ) = err.get("type").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error type: {}", typ));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return Err(msg.to_string());
    }

    root.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| "no message content in first choice".to_string())
}

#[async_trait]
impl TextCompletion for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "response_format": {"type": "json_object"},
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let snippet = raw.chars().take(800).collect::<String>();
            logw(format!("OpenAI HTTP {}", status.as_u16()));
            return Err(ApiError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: snippet,
            });
        }

        openai_extract_message_content(&raw).map_err(|reason| {
            let snippet = raw.chars().take(800).collect::<String>();
            logw(format!("OpenAI raw body: {}", snippet));
            ApiError::Malformed {
                service: SERVICE,
                reason,
            }
        })
    }
}
