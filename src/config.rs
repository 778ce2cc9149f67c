//! Store configuration persisted next to a file store's snapshot.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const CONFIG_FILE: &str = "store_config.json";
const CONFIG_TMP_FILE: &str = "store_config.json.tmp";

/// Encoding of the snapshot payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Bincode,
    /// Human-readable, handy when inspecting a store by hand.
    Json,
}

impl SnapshotFormat {
    pub(crate) fn tag(self) -> u8 {
        match self {
            SnapshotFormat::Bincode => 1,
            SnapshotFormat::Json => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(SnapshotFormat::Bincode),
            2 => Some(SnapshotFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub format: SnapshotFormat,
    /// fsync the snapshot before it replaces the previous one
    #[serde(default = "default_sync")]
    pub sync_on_commit: bool,
}

fn default_sync() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            format: SnapshotFormat::default(),
            sync_on_commit: default_sync(),
        }
    }
}

impl StoreConfig {
    /// Config stored in `dir`, or None when there is none.
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        match fs::read(dir.join(CONFIG_FILE)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the config in `dir` through a temporary file.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let tmp_path = dir.join(CONFIG_TMP_FILE);
        fs::write(&tmp_path, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp_path, dir.join(CONFIG_FILE))?;
        Ok(())
    }
}
