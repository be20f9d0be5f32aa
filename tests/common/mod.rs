//! Shared test fixtures and utilities for integration tests.
//!
//! # Available Fixtures
//!
//! - `scenario_index`: the two-document corpus `D1 = "hello world"`, `D2 = "foo bar"`
//! - `genizah_index`: a handful of Judeo-Arabic and Hebrew fragments with
//!   annotations and varying line counts
//!
//! [`TempWorkspace`] provides filesystem isolation for tests that build their
//! own corpora.

use genizah_search::{BuildOptions, BuildReport, Searcher, build};
use rstest::fixture;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SCENARIO_CORPUS: &str = "==> D1 <==\n 1→hello world\n==> D2 <==\nfoo bar\n";

/// Realistic fragments in the transcription conventions of the corpus.
pub const GENIZAH_CORPUS: &str = "\
==> 990000412990205171_IE104549337_P000001 <==
     1→ואלחמד ללה רב אלעאלמין
     2→אללסאן ממא ילי ⟦ותגי זואיד⟧
     3→פי יום אלשבת
==> 990000412990205171_IE104549337_P000002 <==
     1→שבת שלום ומבורך
==> T-S 10J5.1 <==
     1→כתאב אלי מולאי
     2→אלשיך אבו
     3→][ אלדיאן
     4→ואלסלאם עליך
==> T-S 12.120 <==
     1→ברוך אתה ייי
     2→אלהינו מלך העולם
==> ENA 2556.3 <==
     1→ספר שבתות ומועדים
     2→ביום השבת
     3→ובימים טובים
     4→וראשי חדשים
     5→ולא בחול
";

/// A temporary directory that is removed on drop.
#[allow(dead_code)] // Methods used across different integration test crates
pub struct TempWorkspace {
    _temp: TempDir,
    root: PathBuf,
}

#[allow(dead_code)] // Methods used across different integration test crates
impl TempWorkspace {
    /// Creates a new empty temporary workspace.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = temp.path().to_path_buf();
        Self { _temp: temp, root }
    }

    /// Returns the root path of this workspace.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Writes a file within this workspace and returns its path.
    ///
    /// # Panics
    /// Panics if file creation fails.
    pub fn create_file(&self, path: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let full_path = self.root.join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("Failed to create parent directory for '{}': {}", path, e)
            });
        }
        std::fs::write(&full_path, content)
            .unwrap_or_else(|e| panic!("Failed to write file '{}': {}", path, e));
        full_path
    }

    /// Location for an index inside this workspace. Nothing is created.
    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    /// Builds `corpus` into `index_dir()` with the given batch size.
    pub fn build(&self, corpus: &str, batch_size: usize) -> genizah_search::Result<BuildReport> {
        let corpus_path = self.create_file("corpus.txt", corpus);
        let options = BuildOptions {
            batch_size,
            ..BuildOptions::default()
        };
        build(&self.index_dir(), &corpus_path, &options, None)
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// A built index and a searcher over it.
#[allow(dead_code)] // Fields used across different integration test crates
pub struct BuiltIndex {
    pub workspace: TempWorkspace,
    pub report: BuildReport,
    pub searcher: Searcher,
}

#[allow(dead_code)] // Methods used across different integration test crates
impl BuiltIndex {
    pub fn new(corpus: &str, batch_size: usize) -> Self {
        genizah_search::tracing::init(genizah_search::tracing::LogFormat::Compact, false);
        let workspace = TempWorkspace::new();
        let report = workspace
            .build(corpus, batch_size)
            .expect("Failed to build index");
        let searcher = Searcher::open(workspace.index_dir()).expect("Failed to open index");
        Self {
            workspace,
            report,
            searcher,
        }
    }
}

#[fixture]
pub fn scenario_index() -> BuiltIndex {
    BuiltIndex::new(SCENARIO_CORPUS, 1000)
}

#[fixture]
pub fn genizah_index() -> BuiltIndex {
    BuiltIndex::new(GENIZAH_CORPUS, 2)
}
