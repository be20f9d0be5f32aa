//! In-memory inverted index assembled from committed segments.

use crate::error::{Result, SearchError};
use crate::store::segment::SegmentData;
use crate::types::Document;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Dense document ordinal inside one snapshot or one segment.
pub type DocOrd = u32;

/// Occurrences of one term in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocOrd,
    /// Token positions, ascending.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn term_frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// A document together with its length in tokens, as persisted in segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub document: Document,
    pub length: u32,
}

/// Read capabilities the query engine needs from an index.
///
/// Ordinals are only meaningful for the reader that handed them out.
pub trait IndexReader {
    fn document_count(&self) -> usize;

    fn document(&self, doc: DocOrd) -> Option<&Document>;

    /// Length of a document in tokens.
    fn document_length(&self, doc: DocOrd) -> u32;

    fn average_document_length(&self) -> f32;

    fn lookup(&self, id: &str) -> Option<DocOrd>;

    /// Postings of one exact term, sorted by ordinal.
    fn postings(&self, term: &str) -> &[Posting];

    /// All terms starting with `prefix`, with their postings.
    fn prefix_postings<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a [Posting])> + 'a;

    /// Equality filter on `has_annotations`.
    fn annotation_filter(&self, has_annotations: bool) -> &BTreeSet<DocOrd>;

    /// Inclusive range filter on `line_count`; either bound may be open.
    fn line_count_filter(&self, min: Option<u32>, max: Option<u32>) -> BTreeSet<DocOrd>;

    /// Documents in lexicographic id order.
    fn ids(&self) -> impl Iterator<Item = (&str, DocOrd)> + '_;

    /// Documents in store iteration order (commit order).
    fn scan(&self) -> impl Iterator<Item = (DocOrd, &Document)> + '_;
}

/// Primary records, term postings and structural indexes of one snapshot.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    documents: Vec<IndexedDocument>,
    by_id: BTreeMap<String, DocOrd>,
    terms: BTreeMap<String, Vec<Posting>>,
    annotated: BTreeSet<DocOrd>,
    unannotated: BTreeSet<DocOrd>,
    line_counts: BTreeMap<u32, Vec<DocOrd>>,
    total_length: u64,
}

impl InvertedIndex {
    /// Folds segments, oldest first, into one index.
    ///
    /// A later segment supersedes earlier copies of the same id, either by
    /// carrying a newer version or by listing the id as deleted. Superseded
    /// documents and their postings are dropped together.
    pub fn from_segments(segments: Vec<SegmentData>) -> Result<Self> {
        let mut winners: AHashMap<String, (usize, usize)> = AHashMap::new();
        for (seg_idx, segment) in segments.iter().enumerate() {
            for id in &segment.superseded {
                winners.remove(id);
            }
            for (local, doc) in segment.documents.iter().enumerate() {
                winners.insert(doc.document.id.clone(), (seg_idx, local));
            }
        }

        let mut index = Self::default();
        for (seg_idx, segment) in segments.into_iter().enumerate() {
            let mut remap: Vec<Option<DocOrd>> = vec![None; segment.documents.len()];
            for (local, doc) in segment.documents.into_iter().enumerate() {
                if winners.get(doc.document.id.as_str()) == Some(&(seg_idx, local)) {
                    remap[local] = Some(index.push(doc));
                }
            }

            for (term, postings) in segment.terms {
                let mut live = Vec::with_capacity(postings.len());
                for posting in postings {
                    let Some(slot) = remap.get(posting.doc as usize) else {
                        return Err(SearchError::corrupt(format!(
                            "segment {} has a posting for '{}' pointing at missing document {}",
                            seg_idx, term, posting.doc
                        )));
                    };
                    if let Some(doc) = *slot {
                        live.push(Posting {
                            doc,
                            positions: posting.positions,
                        });
                    }
                }
                if !live.is_empty() {
                    index.terms.entry(term).or_default().extend(live);
                }
            }
        }

        tracing::debug!(
            "Assembled index: {} documents, {} unique terms",
            index.documents.len(),
            index.terms.len()
        );
        Ok(index)
    }

    /// Dumps the live documents and postings as a single segment.
    pub fn into_segment(self) -> SegmentData {
        SegmentData {
            documents: self.documents,
            superseded: Vec::new(),
            terms: self.terms,
        }
    }

    fn push(&mut self, doc: IndexedDocument) -> DocOrd {
        let ord = self.documents.len() as DocOrd;
        self.by_id.insert(doc.document.id.clone(), ord);
        if doc.document.has_annotations {
            self.annotated.insert(ord);
        } else {
            self.unannotated.insert(ord);
        }
        self.line_counts
            .entry(doc.document.line_count)
            .or_default()
            .push(ord);
        self.total_length += u64::from(doc.length);
        self.documents.push(doc);
        ord
    }
}

impl IndexReader for InvertedIndex {
    fn document_count(&self) -> usize {
        self.documents.len()
    }

    fn document(&self, doc: DocOrd) -> Option<&Document> {
        self.documents.get(doc as usize).map(|d| &d.document)
    }

    fn document_length(&self, doc: DocOrd) -> u32 {
        self.documents.get(doc as usize).map_or(0, |d| d.length)
    }

    fn average_document_length(&self) -> f32 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.documents.len() as f32
        }
    }

    fn lookup(&self, id: &str) -> Option<DocOrd> {
        self.by_id.get(id).copied()
    }

    fn postings(&self, term: &str) -> &[Posting] {
        self.terms.get(term).map_or(&[], Vec::as_slice)
    }

    fn prefix_postings<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a [Posting])> + 'a {
        self.terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, postings)| (term.as_str(), postings.as_slice()))
    }

    fn annotation_filter(&self, has_annotations: bool) -> &BTreeSet<DocOrd> {
        if has_annotations {
            &self.annotated
        } else {
            &self.unannotated
        }
    }

    fn line_count_filter(&self, min: Option<u32>, max: Option<u32>) -> BTreeSet<DocOrd> {
        let min = min.unwrap_or(0);
        let max = max.unwrap_or(u32::MAX);
        if min > max {
            return BTreeSet::new();
        }
        self.line_counts
            .range(min..=max)
            .flat_map(|(_, docs)| docs.iter().copied())
            .collect()
    }

    fn ids(&self) -> impl Iterator<Item = (&str, DocOrd)> + '_ {
        self.by_id.iter().map(|(id, ord)| (id.as_str(), *ord))
    }

    fn scan(&self) -> impl Iterator<Item = (DocOrd, &Document)> + '_ {
        self.documents
            .iter()
            .enumerate()
            .map(|(ord, d)| (ord as DocOrd, &d.document))
    }
}
