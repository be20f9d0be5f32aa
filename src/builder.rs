//! Building an index from a corpus file.

use crate::corpus::CorpusParser;
use crate::error::{Result, SearchError};
use crate::store::IndexWriter;
use ahash::AHashSet;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

/// Documents committed per transaction unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub strip_line_numbers: bool,
    pub batch_size: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            strip_line_numbers: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BuildOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SearchError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Receives build progress. Every method has an empty default.
pub trait ProgressSink {
    fn started(&mut self, _total: usize) {}

    fn batch_committed(&mut self, _indexed: usize, _total: usize) {}

    fn optimizing(&mut self) {}

    fn finished(&mut self, _report: &BuildReport) {}
}

/// Summary of a completed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Drafts read from the corpus and committed.
    pub document_count: usize,
    pub batches: usize,
    /// Documents of an earlier build that are no longer in the corpus.
    pub pruned: usize,
    #[serde(skip)]
    pub duration: Duration,
}

/// Builds or rebuilds the index at `index_dir` from the corpus at `corpus_path`.
///
/// Each batch is committed atomically. If reading or committing a batch
/// fails, that batch is discarded and the error returned; batches committed
/// before it stay queryable and the index reports a partial build.
#[tracing::instrument(
    skip_all,
    fields(index = %index_dir.display(), corpus = %corpus_path.display())
)]
pub fn build(
    index_dir: &Path,
    corpus_path: &Path,
    options: &BuildOptions,
    mut progress: Option<&mut dyn ProgressSink>,
) -> Result<BuildReport> {
    options.validate()?;
    let start = Instant::now();

    let parser = CorpusParser::new(corpus_path).strip_line_numbers(options.strip_line_numbers);
    let mut drafts = parser.parse()?;

    let total = match progress.as_deref_mut() {
        Some(sink) => {
            let total = parser.count_documents()?;
            sink.started(total);
            total
        }
        None => 0,
    };

    let mut writer = IndexWriter::acquire(index_dir)?;
    writer.begin_build();
    tracing::info!("Building index with batch size {}", options.batch_size);

    let mut seen: AHashSet<String> = AHashSet::new();
    let mut indexed = 0;
    let mut batches = 0;
    loop {
        let mut tx = writer.transaction();
        let created_at = Utc::now();
        let mut filled = 0;
        for draft in drafts.by_ref().take(options.batch_size) {
            let draft = draft?;
            seen.insert(draft.id.clone());
            tx.insert(draft.into_document(created_at));
            filled += 1;
        }
        if filled == 0 {
            break;
        }

        tx.commit()?;
        batches += 1;
        indexed += filled;
        tracing::debug!("Committed batch {} ({} documents so far)", batches, indexed);
        if let Some(sink) = progress.as_deref_mut() {
            sink.batch_committed(indexed, total);
        }
        if filled < options.batch_size {
            break;
        }
    }

    if let Some(sink) = progress.as_deref_mut() {
        sink.optimizing();
    }
    let compaction = writer.compact(|id| seen.contains(id))?;
    writer.finish_build(compaction.documents as u64)?;

    let report = BuildReport {
        document_count: indexed,
        batches,
        pruned: compaction.pruned,
        duration: start.elapsed(),
    };
    tracing::info!(
        "Indexed {} documents in {} batches ({} pruned) in {:?}",
        report.document_count,
        report.batches,
        report.pruned,
        report.duration
    );
    if let Some(sink) = progress.as_deref_mut() {
        sink.finished(&report);
    }
    Ok(report)
}
