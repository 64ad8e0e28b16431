//! Persistent storage for engine state between runs.
//!
//! Stores the alert states, cooldown timers and rate-limit bucket as a JSON
//! file in the app data directory.

use std::fs;
use std::io;
use std::path::PathBuf;

use super::alerts::engine::EngineSnapshot;

const SNAPSHOT_FILE: &str = "alert_state.json";

pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Load the last saved snapshot.
    ///
    /// A missing file is `None`. So is a corrupt one: losing state only means
    /// current alerts are treated as new again.
    pub fn load(&self) -> io::Result<Option<EngineSnapshot>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                log::warn!("Ignoring unreadable alert state {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, snapshot: &EngineSnapshot) -> io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let content = serde_json::to_string_pretty(snapshot)?;
        // Write then rename so an interrupted save never leaves half a file
        let tmp = self.data_dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        fs::write(&tmp, content)?;
        fs::rename(&tmp, self.snapshot_path())
    }
}
