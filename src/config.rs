use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

/// Runtime configuration for the server and the CLI runner.
///
/// Every field has a default so a partial `config.json` (or an empty
/// environment) still yields a usable configuration; collaborators whose
/// credentials are missing are reported as `not_configured` and the pipeline
/// falls back to its substitutes for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "openai_api_key")]
    pub openai_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,

    #[serde(rename = "replicate_api_token")]
    pub replicate_token: Option<String>,
    pub replicate_model_version: String,
    pub replicate_base_url: String,

    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub supabase_table: String,

    pub video_base_url: String,
    pub placeholder_image_base: String,
    pub data_dir: PathBuf,

    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub compose_timeout_secs: u64,
}

fn default_replicate_version() -> String {
    "ac732df83cea7fff18b8472768c88ad041fa750ff7682a21affe81863cbe77e4".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_key: None,
            openai_model: "gpt-4".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            replicate_token: None,
            replicate_model_version: default_replicate_version(),
            replicate_base_url: "https://api.replicate.com".to_string(),
            supabase_url: None,
            supabase_key: None,
            supabase_table: "movies".to_string(),
            video_base_url: "https://storage.lifecinema.site/videos".to_string(),
            placeholder_image_base: "https://picsum.photos/1280/720".to_string(),
            data_dir: PathBuf::from("data/movies"),
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "https://lifecinema.site".to_string(),
                "http://localhost:3001".to_string(),
            ],
            poll_interval_secs: 5,
            poll_max_attempts: 60,
            compose_timeout_secs: 120,
        }
    }
}

/// Which external collaborators have credentials, as shown by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub openai: bool,
    pub replicate: bool,
    pub supabase: bool,
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
        Ok(config.normalized())
    }

    /// Load `.env` (if any) and then read overrides from the process
    /// environment on top of the defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. `from_env` passes
    /// the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        cfg.openai_key = text("OPENAI_API_KEY");
        cfg.replicate_token = text("REPLICATE_API_TOKEN");
        cfg.supabase_url = text("SUPABASE_URL");
        cfg.supabase_key = text("SUPABASE_KEY");

        if let Some(v) = text("OPENAI_MODEL") {
            cfg.openai_model = v;
        }
        if let Some(v) = text("OPENAI_BASE_URL") {
            cfg.openai_base_url = v;
        }
        if let Some(v) = text("REPLICATE_MODEL_VERSION") {
            cfg.replicate_model_version = v;
        }
        if let Some(v) = text("REPLICATE_BASE_URL") {
            cfg.replicate_base_url = v;
        }
        if let Some(v) = text("SUPABASE_TABLE") {
            cfg.supabase_table = v;
        }
        if let Some(v) = text("VIDEO_BASE_URL") {
            cfg.video_base_url = v;
        }
        if let Some(v) = text("PLACEHOLDER_IMAGE_BASE") {
            cfg.placeholder_image_base = v;
        }
        if let Some(v) = text("DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = text("HOST") {
            cfg.host = v;
        }
        if let Some(v) = text("CORS_ORIGINS") {
            cfg.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        cfg.port = parse_or(&lookup, "PORT", cfg.port)?;
        cfg.poll_interval_secs = parse_or(&lookup, "POLL_INTERVAL_SECS", cfg.poll_interval_secs)?;
        cfg.poll_max_attempts = parse_or(&lookup, "POLL_MAX_ATTEMPTS", cfg.poll_max_attempts)?;
        cfg.compose_timeout_secs =
            parse_or(&lookup, "COMPOSE_TIMEOUT_SECS", cfg.compose_timeout_secs)?;

        Ok(cfg.normalized())
    }

    // Empty credentials count as missing.
    fn normalized(mut self) -> Self {
        for slot in [
            &mut self.openai_key,
            &mut self.replicate_token,
            &mut self.supabase_url,
            &mut self.supabase_key,
        ] {
            if slot.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *slot = None;
            }
        }
        self
    }

    pub fn service_status(&self) -> ServiceStatus {
        ServiceStatus {
            openai: self.openai_key.is_some(),
            replicate: self.replicate_token.is_some(),
            supabase: self.supabase_url.is_some() && self.supabase_key.is_some(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn compose_timeout(&self) -> Duration {
        Duration::from_secs(self.compose_timeout_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        None => Ok(default),
    }
}
