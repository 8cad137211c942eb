use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{MovieStore, merge_fields};
use crate::error::StoreError;
use crate::model::MovieRecord;

/// Stores one JSON file per movie under a directory.
///
/// Movie ids are opaque, so the file stem is an escaped form of the id:
/// ASCII letters, digits and `-` are kept, every other byte becomes `_XX`
/// (lowercase hex). The mapping is injective, so distinct ids never share a
/// file, and [`decode_file_stem`] recovers the id.
pub struct JsonDirStore {
    dir: PathBuf,
}

pub fn encode_file_stem(job_id: &str) -> String {
    let mut stem = String::with_capacity(job_id.len());
    for byte in job_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{byte:02x}"));
        }
    }
    stem
}

pub fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl JsonDirStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        if job_id.is_empty() {
            return Err(StoreError::Unavailable("empty movie id".into()));
        }
        Ok(self.dir.join(format!("{}.json", encode_file_stem(job_id))))
    }

    pub async fn read(&self, job_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.path_for(job_id)?;
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MovieStore for JsonDirStore {
    async fn update(&self, job_id: &str, record: &MovieRecord) -> Result<(), StoreError> {
        let path = self.path_for(job_id)?;
        fs::create_dir_all(&self.dir).await?;

        let mut row = self
            .read(job_id)
            .await?
            .unwrap_or_else(|| serde_json::json!({ "id": job_id }));
        merge_fields(&mut row, serde_json::to_value(record)?);

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&row)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
