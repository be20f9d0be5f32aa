//! The manifest lists the live segments of an index and its metadata.
//!
//! Replacing the manifest is the commit point of every write:
//! 1. write the new segment file and fsync it
//! 2. write `manifest.json.tmp` and fsync it
//! 3. rename it over `manifest.json` and fsync the directory

use crate::error::{Result, SearchError};
use crate::types::{IndexMetadata, IndexState, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";

/// A live segment as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub id: u64,
    pub documents: u32,
    pub checksum: u64,
    pub size_bytes: u64,
}

impl SegmentEntry {
    pub fn file_name(&self) -> String {
        segment_file_name(self.id)
    }
}

pub fn segment_file_name(id: u64) -> String {
    format!("{:08}.seg", id)
}

/// Build progress recorded alongside the segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Building,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    /// Incremented on every commit; readers reload when it changes.
    pub generation: u64,
    pub next_segment_id: u64,
    pub phase: BuildPhase,
    /// Batches committed since the current build started.
    pub committed_batches: u64,
    pub segments: Vec<SegmentEntry>,
    pub metadata: IndexMetadata,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generation: 0,
            next_segment_id: 1,
            phase: BuildPhase::Building,
            committed_batches: 0,
            segments: Vec::new(),
            metadata: IndexMetadata::new(),
        }
    }

    pub fn allocate_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }

    pub fn state(&self) -> IndexState {
        match self.phase {
            BuildPhase::Ready => IndexState::Ready,
            BuildPhase::Building if self.segments.is_empty() && self.committed_batches == 0 => {
                IndexState::Absent
            }
            BuildPhase::Building => IndexState::Building {
                committed_batches: self.committed_batches,
            },
        }
    }

    /// True if both manifests describe the same commit of the same index.
    ///
    /// Generations restart when a directory is deleted and rebuilt, so the
    /// creation time of the index is compared as well.
    pub fn is_same_commit(&self, other: &Self) -> bool {
        self.generation == other.generation
            && self.metadata.created_at == other.metadata.created_at
    }

    /// Reads the manifest of `dir`; `Ok(None)` if the directory holds no index.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SearchError::storage(
                    format!("failed to read {}", path.display()),
                    e,
                ));
            }
        };

        let manifest: Self = serde_json::from_slice(&bytes).map_err(|e| {
            SearchError::corrupt(format!("failed to parse {}: {}", path.display(), e))
        })?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(SearchError::corrupt(format!(
                "index schema version {} is not supported (expected {})",
                manifest.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(Some(manifest))
    }

    /// Atomically replaces the manifest of `dir`.
    pub fn store(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| SearchError::corrupt(format!("failed to encode manifest: {}", e)))?;

        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp);
            return Err(SearchError::storage("failed to write manifest", e));
        }
        fs::rename(&tmp, &path)
            .map_err(|e| SearchError::storage("failed to commit manifest", e))?;
        sync_dir(dir);

        tracing::debug!("Committed manifest generation {}", self.generation);
        Ok(())
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Makes a rename durable. Directories cannot be opened for syncing on every
/// platform, so failures are only logged.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            tracing::debug!("Could not fsync {}: {}", dir.display(), e);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}
