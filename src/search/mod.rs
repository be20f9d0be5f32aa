//! Full-text search infrastructure.
//!
//! Tokenization, the in-memory inverted index, query parsing, BM25 scoring
//! and snippet generation.

pub mod highlight;
pub mod index;
pub mod query;
pub mod scoring;
pub mod tokenize;

pub use highlight::{HighlightOptions, TermMatcher, highlight};
pub use index::{DocOrd, IndexReader, InvertedIndex, Posting};
pub use query::QueryNode;
pub use scoring::Bm25Params;
pub use tokenize::{normalize, tokenize};
