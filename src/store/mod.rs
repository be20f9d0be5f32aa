//! Persistent index storage.
//!
//! An index directory holds immutable segment files and a manifest naming the
//! live ones. Writers add segments and atomically swap the manifest; readers
//! load the segments of one manifest generation into an immutable
//! [`Snapshot`] and never see a batch that was not fully committed.

pub mod manifest;
pub mod segment;
mod writer;

pub use manifest::{BuildPhase, Manifest, SegmentEntry};
pub use writer::{CompactionReport, IndexWriter, Transaction};

use crate::error::{Result, SearchError};
use crate::search::index::{IndexReader, InvertedIndex};
use crate::types::{IndexMetadata, IndexState};
use parking_lot::{Mutex, RwLock};
use segment::{ReadError, SegmentData};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SEGMENTS_DIR: &str = "segments";
const LOCK_FILE: &str = "write.lock";

/// How often a reader retries when compaction removes segments under it.
const LOAD_ATTEMPTS: usize = 3;

/// Immutable view of one committed manifest generation.
#[derive(Debug)]
pub struct Snapshot {
    manifest: Manifest,
    index: InvertedIndex,
}

impl Snapshot {
    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    pub fn state(&self) -> IndexState {
        self.manifest.state()
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.manifest.metadata
    }

    pub fn segment_count(&self) -> usize {
        self.manifest.segments.len()
    }
}

/// Handle to an index directory.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and readers on
/// any number of threads can call [`IndexStore::snapshot`] concurrently.
pub struct IndexStore {
    root: PathBuf,
    current: RwLock<Arc<Snapshot>>,
    reload: Mutex<()>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.read();
        f.debug_struct("IndexStore")
            .field("root", &self.root)
            .field("generation", &current.generation())
            .field("documents", &current.index.document_count())
            .finish()
    }
}

impl IndexStore {
    /// Opens an existing index.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let snapshot = load_snapshot(&root)?.ok_or_else(|| SearchError::IndexNotFound {
            path: root.clone(),
        })?;
        tracing::info!(
            "Opened index generation {} ({})",
            snapshot.generation(),
            snapshot.state()
        );
        Ok(Self::with_snapshot(root, snapshot))
    }

    /// Lifecycle state of the index at `path` without opening it.
    pub fn probe(path: impl AsRef<Path>) -> Result<IndexState> {
        Ok(Manifest::load(path.as_ref())?.map_or(IndexState::Absent, |m| m.state()))
    }

    fn with_snapshot(root: PathBuf, snapshot: Snapshot) -> Self {
        Self {
            root,
            current: RwLock::new(Arc::new(snapshot)),
            reload: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Returns the latest committed snapshot, reloading it if a writer committed since.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.refresh()?;
        Ok(self.current.read().clone())
    }

    /// Reloads if the directory now holds a different commit, either a newer
    /// generation or an index rebuilt from scratch. Returns whether a reload happened.
    pub fn refresh(&self) -> Result<bool> {
        let Some(manifest) = Manifest::load(&self.root)? else {
            return Err(SearchError::IndexNotFound {
                path: self.root.clone(),
            });
        };
        if self.current.read().manifest.is_same_commit(&manifest) {
            return Ok(false);
        }

        let _guard = self.reload.lock();
        if self.current.read().manifest.is_same_commit(&manifest) {
            return Ok(false);
        }
        let Some(snapshot) = load_snapshot(&self.root)? else {
            return Err(SearchError::IndexNotFound {
                path: self.root.clone(),
            });
        };
        tracing::debug!(
            "Reloaded index {} at generation {}",
            self.root.display(),
            snapshot.generation()
        );
        *self.current.write() = Arc::new(snapshot);
        Ok(true)
    }

    /// Takes the exclusive writer role for this index.
    ///
    /// Fails with `StorageFailure` while another writer, in this process or
    /// another, holds it.
    pub fn writer(&self) -> Result<IndexWriter> {
        IndexWriter::acquire(&self.root)
    }

    /// Releases the handle. Snapshots already handed out stay valid.
    pub fn close(self) {
        tracing::debug!("Closed index {}", self.root.display());
    }
}

pub(crate) fn segments_dir(root: &Path) -> PathBuf {
    root.join(SEGMENTS_DIR)
}

pub(crate) fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

/// Reads every segment listed in `manifest`, oldest first.
pub(crate) fn read_segments(
    root: &Path,
    manifest: &Manifest,
) -> std::result::Result<Vec<SegmentData>, ReadError> {
    let dir = segments_dir(root);
    manifest
        .segments
        .iter()
        .map(|entry| segment::read(&dir.join(entry.file_name()), entry.checksum))
        .collect()
}

fn load_snapshot(root: &Path) -> Result<Option<Snapshot>> {
    for attempt in 1..=LOAD_ATTEMPTS {
        let Some(manifest) = Manifest::load(root)? else {
            return Ok(None);
        };
        match read_segments(root, &manifest) {
            Ok(segments) => {
                let index = InvertedIndex::from_segments(segments)?;
                return Ok(Some(Snapshot { manifest, index }));
            }
            Err(ReadError::Missing) => {
                tracing::debug!(
                    "Segment of generation {} vanished during load (attempt {})",
                    manifest.generation,
                    attempt
                );
            }
            Err(ReadError::Failed(e)) => return Err(e),
        }
    }
    Err(SearchError::corrupt(format!(
        "manifest in {} keeps referencing missing segments",
        root.display()
    )))
}
