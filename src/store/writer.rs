//! Single-writer access to an index directory.

use super::manifest::{BuildPhase, Manifest, SegmentEntry, segment_file_name};
use super::segment::{self, ReadError, SegmentData};
use super::{lock_path, read_segments, segments_dir};
use crate::error::{Result, SearchError};
use crate::search::index::{IndexReader, InvertedIndex};
use crate::types::{Document, IndexMetadata};
use ahash::AHashMap;
use chrono::Utc;
use fs2::FileExt;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive writer of one index directory.
///
/// Holds an OS file lock on `write.lock` for its whole lifetime; the lock is
/// released when the writer is dropped.
#[derive(Debug)]
pub struct IndexWriter {
    root: PathBuf,
    manifest: Manifest,
    /// The next commit starts a new build and resets the batch counter.
    build_pending: bool,
    _lock: File,
}

/// Outcome of [`IndexWriter::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub merged_segments: usize,
    pub documents: usize,
    pub pruned: usize,
}

impl IndexWriter {
    pub(crate) fn acquire(root: &Path) -> Result<Self> {
        fs::create_dir_all(segments_dir(root)).map_err(|e| {
            SearchError::storage(format!("failed to create index at {}", root.display()), e)
        })?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path(root))
            .map_err(|e| SearchError::storage("failed to open write lock", e))?;
        lock.try_lock_exclusive().map_err(|e| {
            SearchError::storage(
                format!("index at {} is locked by another writer", root.display()),
                e,
            )
        })?;

        let manifest = Manifest::load(root)?.unwrap_or_default();
        tracing::debug!(
            "Acquired writer for {} at generation {}",
            root.display(),
            manifest.generation
        );
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            build_pending: false,
            _lock: lock,
        })
    }

    /// The manifest as of the last successful commit of this writer.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Marks the start of a full build. The first commit afterwards moves the
    /// index back to `Building` with a fresh batch counter.
    pub fn begin_build(&mut self) {
        self.build_pending = true;
    }

    /// Opens a write transaction. Nothing it stages is visible before `commit`.
    pub fn transaction(&mut self) -> Transaction<'_> {
        Transaction {
            writer: self,
            slots: Vec::new(),
            by_id: AHashMap::new(),
            deletes: BTreeSet::new(),
        }
    }

    /// Merges all live segments into one, dropping documents `retain` rejects.
    #[tracing::instrument(skip_all, fields(segments = self.manifest.segments.len()))]
    pub fn compact(&mut self, retain: impl Fn(&str) -> bool) -> Result<CompactionReport> {
        let merged_segments = self.manifest.segments.len();
        let mut index = self.load_index()?;

        let pruned: Vec<String> = index
            .ids()
            .filter(|(id, _)| !retain(id))
            .map(|(id, _)| id.to_string())
            .collect();
        if !pruned.is_empty() {
            let deletions = SegmentData {
                superseded: pruned.clone(),
                ..SegmentData::default()
            };
            index = InvertedIndex::from_segments(vec![index.into_segment(), deletions])?;
        }

        let documents = index.document_count();
        let mut next = self.manifest.clone();
        let old = std::mem::take(&mut next.segments);
        let mut written_path = None;
        if documents > 0 {
            let (entry, path) = write_segment(&self.root, &mut next, &index.into_segment())?;
            next.segments.push(entry);
            written_path = Some(path);
        }
        next.generation += 1;
        self.store_manifest(next, written_path.as_deref())?;

        let dir = segments_dir(&self.root);
        for entry in old {
            let path = dir.join(entry.file_name());
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to remove merged segment {}: {}", path.display(), e);
            }
        }

        tracing::info!(
            "Compacted {} segments into {} documents ({} pruned)",
            merged_segments,
            documents,
            pruned.len()
        );
        Ok(CompactionReport {
            merged_segments,
            documents,
            pruned: pruned.len(),
        })
    }

    /// Records the final metadata of a build and marks the index `Ready`.
    pub fn finish_build(&mut self, document_count: u64) -> Result<IndexMetadata> {
        let mut next = self.manifest.clone();
        next.metadata.document_count = document_count;
        next.metadata.last_updated = Some(Utc::now());
        next.phase = BuildPhase::Ready;
        next.generation += 1;
        self.store_manifest(next, None)?;
        self.build_pending = false;
        Ok(self.manifest.metadata.clone())
    }

    fn load_index(&self) -> Result<InvertedIndex> {
        let segments = read_segments(&self.root, &self.manifest).map_err(|e| match e {
            ReadError::Missing => SearchError::corrupt(format!(
                "segment listed in the manifest of {} is missing",
                self.root.display()
            )),
            ReadError::Failed(e) => e,
        })?;
        InvertedIndex::from_segments(segments)
    }

    /// Publishes `next`. On failure the segment written for it is removed and
    /// the writer keeps its previous manifest.
    fn store_manifest(&mut self, next: Manifest, written: Option<&Path>) -> Result<()> {
        if let Err(e) = next.store(&self.root) {
            if let Some(path) = written {
                let _ = fs::remove_file(path);
            }
            return Err(e);
        }
        self.manifest = next;
        Ok(())
    }
}

fn write_segment(
    root: &Path,
    manifest: &mut Manifest,
    data: &SegmentData,
) -> Result<(SegmentEntry, PathBuf)> {
    let id = manifest.allocate_segment_id();
    let path = segments_dir(root).join(segment_file_name(id));
    let written = segment::write(&path, data)?;
    let entry = SegmentEntry {
        id,
        documents: data.documents.len() as u32,
        checksum: written.checksum,
        size_bytes: written.size_bytes,
    };
    Ok((entry, path))
}

/// A batch of inserts and deletes that becomes visible atomically.
///
/// Dropping a transaction without committing discards it.
pub struct Transaction<'w> {
    writer: &'w mut IndexWriter,
    slots: Vec<Option<Document>>,
    by_id: AHashMap<String, usize>,
    deletes: BTreeSet<String>,
}

impl Transaction<'_> {
    /// Stages a document, replacing any stored document with the same id.
    /// A second insert of the same id in one transaction wins over the first.
    pub fn insert(&mut self, document: Document) {
        self.deletes.remove(&document.id);
        if let Some(&slot) = self.by_id.get(&document.id) {
            self.slots[slot] = Some(document);
        } else {
            self.by_id.insert(document.id.clone(), self.slots.len());
            self.slots.push(Some(document));
        }
    }

    /// Stages removal of a document.
    pub fn delete(&mut self, id: &str) {
        if let Some(slot) = self.by_id.remove(id) {
            self.slots[slot] = None;
        }
        self.deletes.insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.by_id.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the batch as a new segment and publishes it.
    ///
    /// Returns `None` for an empty transaction, which commits nothing.
    pub fn commit(self) -> Result<Option<SegmentEntry>> {
        if self.is_empty() {
            return Ok(None);
        }
        let Self {
            writer,
            slots,
            deletes,
            ..
        } = self;

        let documents: Vec<Document> = slots.into_iter().flatten().collect();
        let mut data = SegmentData::from_documents(documents);
        data.superseded.extend(deletes);

        let mut next = writer.manifest.clone();
        let (entry, path) = write_segment(&writer.root, &mut next, &data)?;
        next.segments.push(entry.clone());
        next.generation += 1;
        if writer.build_pending {
            next.phase = BuildPhase::Building;
            next.committed_batches = 0;
        }
        if next.phase == BuildPhase::Building {
            next.committed_batches += 1;
        }
        writer.store_manifest(next, Some(&path))?;
        writer.build_pending = false;

        tracing::debug!(
            "Committed segment {} with {} documents",
            entry.id,
            entry.documents
        );
        Ok(Some(entry))
    }

    /// Discards everything staged.
    pub fn rollback(self) {
        tracing::debug!("Rolled back transaction of {} operations", self.len());
    }
}
