//! Persistence of terminal movie records.
//!
//! The store only ever sees keyed partial updates: each update's fields are
//! merged over whatever is already stored for that movie id.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::MovieRecord;

mod json_dir;
mod supabase;

pub use json_dir::{JsonDirStore, decode_file_stem, encode_file_stem};
pub use supabase::SupabaseStore;

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn update(&self, job_id: &str, record: &MovieRecord) -> Result<(), StoreError>;
}

/// Shallow-merge the top-level fields of `update` into `existing`.
pub(crate) fn merge_fields(existing: &mut serde_json::Value, update: serde_json::Value) {
    match update {
        serde_json::Value::Object(fields) if existing.is_object() => {
            if let Some(target) = existing.as_object_mut() {
                target.extend(fields);
            }
        }
        other => *existing = other,
    }
}

/// In-process store. Keeps the merged row per movie and a log of every
/// update in arrival order.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, serde_json::Value>>,
    writes: Mutex<Vec<MovieRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<serde_json::Value> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned()
    }

    pub fn writes(&self) -> Vec<MovieRecord> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn writes_for(&self, job_id: &str) -> Vec<MovieRecord> {
        self.writes()
            .into_iter()
            .filter(|r| r.job_id == job_id)
            .collect()
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn update(&self, job_id: &str, record: &MovieRecord) -> Result<(), StoreError> {
        let fields = serde_json::to_value(record)?;
        {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            let row = rows
                .entry(job_id.to_string())
                .or_insert_with(|| serde_json::json!({ "id": job_id }));
            merge_fields(row, fields);
        }
        let mut logged = record.clone();
        logged.job_id = job_id.to_string();
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(logged);
        Ok(())
    }
}
