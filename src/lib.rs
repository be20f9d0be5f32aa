//! Search engine for transcribed manuscript corpora.
//!
//! A corpus file is parsed into documents ([`corpus`]), committed in batches
//! to a persistent segment store ([`store`], [`builder`]) and queried in four
//! modes: ranked full-text, document id, regex scan and filtered full-text
//! ([`Searcher`]).
//!
//! ```no_run
//! use genizah_search::{BuildOptions, Searcher, build};
//! use std::path::Path;
//!
//! # fn main() -> genizah_search::Result<()> {
//! build(Path::new("index"), Path::new("corpus.txt"), &BuildOptions::default(), None)?;
//! let searcher = Searcher::open("index")?;
//! for hit in searcher.fulltext("שבת", 10, true)? {
//!     println!("{} {:.2}", hit.id, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod search;
pub mod searcher;
pub mod store;
pub mod tracing;
pub mod types;

pub use builder::{BuildOptions, BuildReport, ProgressSink, build};
pub use config::Config;
pub use corpus::{CorpusParser, DocumentDraft};
pub use error::{Result, SearchError};
pub use search::{Bm25Params, HighlightOptions};
pub use searcher::{AdvancedQuery, Query, QueryMode, ScanBudget, SearchSettings, Searcher};
pub use store::{IndexStore, IndexWriter, Snapshot, Transaction};
pub use types::{
    Document, IndexMetadata, IndexState, IndexStatistics, SearchHit, SearchResults,
};
