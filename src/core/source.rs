use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::alerts::model::AlertRecord;

/// Supplies the full list of currently active alerts once per poll.
pub trait AlertSource {
    fn fetch(&mut self) -> io::Result<Vec<AlertRecord>>;
}

/// Reads a JSON array of normalized alerts written by a provider adapter.
pub struct FileAlertSource {
    path: PathBuf,
}

impl FileAlertSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertSource for FileAlertSource {
    /// A feed file that doesn't exist yet means no active alerts.
    ///
    /// Only a feed that isn't a JSON array is an error. A single record
    /// that can't be decoded is skipped so the rest still get processed.
    fn fetch(&mut self) -> io::Result<Vec<AlertRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let raw: Vec<Value> = serde_json::from_str(&content)?;
        Ok(decode_records(raw))
    }
}

fn decode_records(raw: Vec<Value>) -> Vec<AlertRecord> {
    let mut alerts = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        let raw_id = value
            .get("id")
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<none>".to_string());
        match serde_json::from_value::<AlertRecord>(value) {
            Ok(alert) => alerts.push(alert),
            Err(e) => {
                log::warn!("Skipping feed record {} (id {}): {}", index, raw_id, e);
            }
        }
    }
    alerts
}
