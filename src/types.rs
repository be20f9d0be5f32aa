use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Version of the on-disk layout written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// A committed document as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub line_count: u32,
    pub has_annotations: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry of a result sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub line_count: u32,
    pub has_annotations: bool,
    pub score: f32,
    pub highlight: Option<String>,
}

impl SearchHit {
    /// Score given to hits of unranked modes (docid, regex, structural filters).
    pub const UNRANKED: f32 = 1.0;

    pub(crate) fn from_document(doc: &Document, score: f32, highlight: Option<String>) -> Self {
        Self {
            id: doc.id.clone(),
            content: doc.content.clone(),
            line_count: doc.line_count,
            has_annotations: doc.has_annotations,
            score,
            highlight,
        }
    }
}

/// Ordered hits of one query plus the plain numbers an observability wrapper needs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Wall-clock time spent inside the engine.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// Documents examined to produce the hits (candidates for ranked modes, scanned for regex).
    pub documents_scanned: usize,
    /// True when a scan budget stopped the query before it saw the whole corpus.
    pub truncated: bool,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.id.as_str()).collect()
    }
}

impl IntoIterator for SearchResults {
    type Item = SearchHit;
    type IntoIter = std::vec::IntoIter<SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

/// Singleton metadata record maintained by the writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub document_count: u64,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl IndexMetadata {
    pub(crate) fn new() -> Self {
        Self {
            document_count: 0,
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            last_updated: None,
        }
    }
}

/// Lifecycle of an index directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexState {
    /// Nothing has been written yet.
    Absent,
    /// A build is running or stopped before finishing.
    Building { committed_batches: u64 },
    /// The last build compacted the index and recorded its metadata.
    Ready,
}

impl IndexState {
    /// Some batches are committed but the build has not reached `Ready`.
    pub const fn is_partial(self) -> bool {
        matches!(self, Self::Building { committed_batches } if committed_batches > 0)
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Building { committed_batches } => {
                write!(f, "building ({} batches committed)", committed_batches)
            }
            Self::Ready => f.write_str("ready"),
        }
    }
}

/// Answer to `Searcher::statistics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatistics {
    pub total_documents: usize,
    pub documents_with_annotations: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub state: IndexState,
    pub segment_count: usize,
}

impl IndexStatistics {
    /// Share of documents carrying annotation markers, in percent.
    pub fn annotation_percentage(&self) -> f64 {
        if self.total_documents == 0 {
            0.0
        } else {
            self.documents_with_annotations as f64 / self.total_documents as f64 * 100.0
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}
