//! BM25 relevance scoring.
//!
//! For each query leaf `t` matching document `d`:
//!
//! ```text
//! score += idf(t) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * dl / avgdl))
//! idf(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
//! ```
//!
//! The smoothed IDF stays positive even for terms present in every document.

use serde::{Deserialize, Serialize};

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term frequency saturation.
    pub k1: f32,
    /// Length normalization strength, 0.0 (none) to 1.0 (full).
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Corpus-wide numbers every score depends on.
#[derive(Debug, Clone, Copy)]
pub struct CorpusStats {
    pub document_count: usize,
    pub average_length: f32,
}

impl Bm25Params {
    pub fn validate(&self) -> Result<(), String> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(format!("bm25.k1 must be a non-negative number, got {}", self.k1));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(format!("bm25.b must be between 0 and 1, got {}", self.b));
        }
        Ok(())
    }

    /// Contribution of one leaf occurring `tf` times in a document of `length` tokens.
    pub fn score(&self, tf: u32, length: u32, df: usize, stats: CorpusStats) -> f32 {
        if tf == 0 {
            return 0.0;
        }
        let tf = tf as f32;
        let norm = if stats.average_length > 0.0 {
            length as f32 / stats.average_length
        } else {
            1.0
        };
        let denominator = tf + self.k1 * (1.0 - self.b + self.b * norm);
        idf(df, stats.document_count) * tf * (self.k1 + 1.0) / denominator
    }
}

/// Smoothed inverse document frequency.
pub fn idf(df: usize, document_count: usize) -> f32 {
    let n = document_count as f32;
    let df = df as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}
