//! JSON snapshot of the ledger on local disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use superchat_common::store::StoreSnapshot;
use superchat_common::streamer::StreamerProfile;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub store: StoreSnapshot,
    #[serde(default)]
    pub streamers: Vec<StreamerProfile>,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Location of the snapshot file. Writes go to a sibling temp file first and
/// are renamed into place, so a crash never leaves a half-written snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/superchat/ledger.json`, falling back to `/tmp`.
    pub fn default_path() -> PathBuf {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        base.join("superchat").join("ledger.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or `None` if none has been written yet.
    pub fn load(&self) -> Result<Option<LedgerSnapshot>, PersistError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let snapshot = serde_json::from_str(&data).map_err(|source| PersistError::Serde {
            path: self.path.clone(),
            source,
        })?;
        info!("Loaded ledger snapshot from {}", self.path.display());
        Ok(Some(snapshot))
    }

    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let data = serde_json::to_string_pretty(snapshot).map_err(|source| PersistError::Serde {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}
