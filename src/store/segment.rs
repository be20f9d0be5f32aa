//! Segment files: one committed batch of documents and their postings.
//!
//! Layout: `MAGIC` (4 bytes), format version (u32 LE), xxh3-64 checksum of the
//! payload (u64 LE), payload length (u64 LE), postcard payload.

use crate::error::{Result, SearchError};
use crate::search::index::{IndexedDocument, Posting};
use crate::search::tokenize::TermBuilder;
use crate::types::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

const MAGIC: &[u8; 4] = b"GZSG";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// Contents of one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentData {
    /// Documents in commit order; the position is the segment-local ordinal.
    pub documents: Vec<IndexedDocument>,
    /// Ids whose copies in older segments are removed by this segment.
    pub superseded: Vec<String>,
    /// Postings keyed by term, referring to segment-local ordinals.
    pub terms: BTreeMap<String, Vec<Posting>>,
}

impl SegmentData {
    /// Tokenizes the documents and builds their postings.
    ///
    /// Every id is also recorded as superseded so older copies disappear when
    /// this segment becomes visible.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let mut builder = TermBuilder::default();
        let mut indexed = Vec::with_capacity(documents.len());
        let mut superseded = Vec::with_capacity(documents.len());

        for (ord, document) in documents.into_iter().enumerate() {
            let length = builder.add_document(ord as u32, &document.content);
            superseded.push(document.id.clone());
            indexed.push(IndexedDocument { document, length });
        }

        Self {
            documents: indexed,
            superseded,
            terms: builder.finalize(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(self)
            .map_err(|e| SearchError::corrupt(format!("failed to encode segment: {}", e)))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&xxh3_64(&payload).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(SearchError::corrupt("not a segment file"));
        }

        let version = u32::from_le_bytes(read_array(&bytes[4..8]));
        if version != FORMAT_VERSION {
            return Err(SearchError::corrupt(format!(
                "unsupported segment format version {}",
                version
            )));
        }

        let checksum = u64::from_le_bytes(read_array(&bytes[8..16]));
        let len = u64::from_le_bytes(read_array(&bytes[16..24]));
        let payload = &bytes[HEADER_LEN..];
        if payload.len() as u64 != len {
            return Err(SearchError::corrupt(format!(
                "segment payload is {} bytes, header says {}",
                payload.len(),
                len
            )));
        }
        if xxh3_64(payload) != checksum {
            return Err(SearchError::corrupt("segment checksum mismatch"));
        }

        postcard::from_bytes(payload)
            .map_err(|e| SearchError::corrupt(format!("failed to decode segment: {}", e)))
    }
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

/// Summary of a written segment file.
#[derive(Debug, Clone, Copy)]
pub struct WrittenSegment {
    pub checksum: u64,
    pub size_bytes: u64,
}

/// Writes a segment next to its final path and renames it into place.
pub fn write(path: &Path, segment: &SegmentData) -> Result<WrittenSegment> {
    let bytes = segment.encode()?;
    let tmp = path.with_extension("seg.tmp");

    let write_tmp = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()
    };
    if let Err(e) = write_tmp() {
        let _ = fs::remove_file(&tmp);
        return Err(SearchError::storage(
            format!("failed to write segment {}", tmp.display()),
            e,
        ));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        SearchError::storage(format!("failed to move segment to {}", path.display()), e)
    })?;

    Ok(WrittenSegment {
        checksum: xxh3_64(&bytes[HEADER_LEN..]),
        size_bytes: bytes.len() as u64,
    })
}

/// Reads and verifies a segment file.
///
/// A missing file is reported as `NotFound` so readers racing a compaction can retry.
pub fn read(path: &Path, expected_checksum: u64) -> std::result::Result<SegmentData, ReadError> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReadError::Missing
        } else {
            ReadError::Failed(SearchError::storage(
                format!("failed to read segment {}", path.display()),
                e,
            ))
        }
    })?;

    let segment = SegmentData::decode(&bytes).map_err(ReadError::Failed)?;
    let checksum = xxh3_64(&bytes[HEADER_LEN..]);
    if checksum != expected_checksum {
        return Err(ReadError::Failed(SearchError::corrupt(format!(
            "segment {} does not match its manifest entry",
            path.display()
        ))));
    }
    Ok(segment)
}

#[derive(Debug)]
pub enum ReadError {
    Missing,
    Failed(SearchError),
}
