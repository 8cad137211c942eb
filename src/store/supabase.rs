use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::MovieStore;
use crate::error::StoreError;
use crate::model::MovieRecord;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Updates rows of a Supabase table through its PostgREST endpoint.
pub struct SupabaseStore {
    client: Client,
    url: String,
    key: String,
    table: String,
}

impl SupabaseStore {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            table: table.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

#[async_trait]
impl MovieStore for SupabaseStore {
    async fn update(&self, job_id: &str, record: &MovieRecord) -> Result<(), StoreError> {
        let filter = format!("eq.{job_id}");
        let resp = self
            .client
            .patch(self.endpoint())
            .query(&[("id", filter.as_str())])
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "return=minimal")
            .json(record)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: body.chars().take(800).collect(),
            });
        }
        Ok(())
    }
}
