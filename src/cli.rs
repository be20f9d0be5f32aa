use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "genizah-search")]
#[command(about = "Index and search Cairo Genizah transcriptions", long_about = None)]
pub struct Cli {
    /// Index directory (overrides the config file and GENIZAH_INDEX_PATH).
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build or rebuild the index from a corpus file.
    Index {
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory; defaults to the configured index path.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep `   12→` line-number prefixes in document content.
        #[arg(long)]
        keep_line_numbers: bool,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(short, long)]
        quiet: bool,
    },
    /// Search the index.
    Search {
        #[arg(short, long)]
        query: String,
        #[arg(short = 't', long = "type", value_enum, default_value_t = SearchType::Fulltext)]
        search_type: SearchType,
        #[arg(short, long, default_value = "10")]
        limit: usize,
        #[arg(long)]
        no_highlights: bool,
        /// Show full document content instead of snippets.
        #[arg(short, long)]
        full: bool,
        #[arg(long, value_enum, default_value_t = AnnotationFilter::Any)]
        annotations: AnnotationFilter,
        #[arg(long)]
        min_lines: Option<u32>,
        #[arg(long)]
        max_lines: Option<u32>,
        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Print one document.
    Show { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchType {
    Fulltext,
    Docid,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnnotationFilter {
    Yes,
    No,
    Any,
}

impl AnnotationFilter {
    pub fn as_filter(self) -> Option<bool> {
        match self {
            Self::Yes => Some(true),
            Self::No => Some(false),
            Self::Any => None,
        }
    }
}
