use anyhow::{Context, Result};
use tokio::fs;

use crate::config::Config;
use crate::{logi, logw};

/// Create the local record directory unless records go to Supabase.
pub async fn ensure_directories(config: &Config) -> Result<()> {
    if config.service_status().supabase {
        return Ok(());
    }
    let dir = config.data_dir.as_path();
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data dir: {}", dir.display()))?;
        logi(format!("Created directory: {}", dir.display()));
    }
    Ok(())
}

/// Log which external collaborators will be used.
pub fn report_services(config: &Config) {
    let status = config.service_status();
    for (name, configured) in [
        ("openai", status.openai),
        ("replicate", status.replicate),
        ("supabase", status.supabase),
    ] {
        if configured {
            logi(format!("{} configured", name));
        } else {
            logw(format!("{} not configured", name));
        }
    }
}
