use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::ArtifactError;

/// The three pieces that make up one trained model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKey {
    Model,
    Scaler,
    LabelCodec,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 3] = [ArtifactKey::Model, ArtifactKey::Scaler, ArtifactKey::LabelCodec];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKey::Model => "model",
            ArtifactKey::Scaler => "scaler",
            ArtifactKey::LabelCodec => "label_codec",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKey::Model => "trading_model.json",
            ArtifactKey::Scaler => "scaler.json",
            ArtifactKey::LabelCodec => "label_codec.json",
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic version shared by the pieces of one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ModelVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// Version for the next successful train given the live one, if any
    pub fn next(current: Option<&ModelVersion>) -> Self {
        current.map(ModelVersion::bump_patch).unwrap_or_else(Self::initial)
    }
}

impl FromStr for ModelVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(anyhow!("Invalid version format: {}", s));
        }

        Ok(Self {
            major: parts[0].parse()?,
            minor: parts[1].parse()?,
            patch: parts[2].parse()?,
        })
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One persisted piece plus the version it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope<T> {
    pub version: ModelVersion,
    pub saved_at: DateTime<Utc>,
    pub payload: T,
}

/// Opaque blob storage for artifact pieces.
///
/// `get` returns `Ok(None)` for a piece that was never written. A reader must
/// see either a complete earlier blob or a complete newer one for each key.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, key: ArtifactKey, bytes: &[u8]) -> Result<()>;
    fn get(&self, key: ArtifactKey) -> Result<Option<Vec<u8>>>;
}

pub fn write_envelope<T: Serialize>(
    store: &dyn ArtifactStore,
    key: ArtifactKey,
    version: &ModelVersion,
    payload: &T,
) -> Result<()> {
    let envelope = ArtifactEnvelope {
        version: version.clone(),
        saved_at: Utc::now(),
        payload,
    };
    let bytes = serde_json::to_vec(&envelope).with_context(|| format!("serializing {}", key))?;
    store.put(key, &bytes)?;
    debug!("Stored {} v{} ({} bytes)", key, version, bytes.len());
    Ok(())
}

pub fn read_envelope<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    key: ArtifactKey,
) -> Result<ArtifactEnvelope<T>, ArtifactError> {
    let bytes = store
        .get(key)
        .map_err(ArtifactError::Store)?
        .ok_or(ArtifactError::Missing(key))?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Corrupt {
        key,
        reason: e.to_string(),
    })
}

/// Directory-backed store; one JSON file per piece
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: ArtifactKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl ArtifactStore for FileArtifactStore {
    fn put(&self, key: ArtifactKey, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating model directory {}", self.dir.display()))?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp", key.file_name()));
        fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &target)
            .with_context(|| format!("renaming {} to {}", tmp.display(), target.display()))?;

        info!("Saved {} to {}", key, target.display());
        Ok(())
    }

    fn get(&self, key: ArtifactKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("reading {}: {}", path.display(), e)),
        }
    }
}

/// In-process store, used by tests and short-lived tools
#[derive(Default)]
pub struct MemoryArtifactStore {
    pieces: Mutex<HashMap<ArtifactKey, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, key: ArtifactKey) -> Result<()> {
        self.pieces
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?
            .remove(&key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pieces.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, key: ArtifactKey, bytes: &[u8]) -> Result<()> {
        self.pieces
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?
            .insert(key, bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: ArtifactKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .pieces
            .lock()
            .map_err(|_| anyhow!("artifact store lock poisoned"))?
            .get(&key)
            .cloned())
    }
}
