use anyhow::{Context, Result};
use clap::Parser;
use genizah_search::cli::{Cli, Commands, SearchType};
use genizah_search::tracing::LogFormat;
use genizah_search::{
    AdvancedQuery, BuildReport, Config, IndexStatistics, IndexStore, ProgressSink, Query,
    QueryMode, SearchHit, SearchResults, Searcher, build,
};
use std::io::Write;
use std::path::Path;

/// Longest content printed by `search --full` before truncating.
const FULL_CONTENT_CHARS: usize = 2000;

fn main() {
    let cli = Cli::parse();
    let quiet = matches!(cli.command, Commands::Index { quiet: true, .. });
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    genizah_search::tracing::init(format, quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        if let Some(genizah_search::SearchError::IndexNotFound { .. }) = e.downcast_ref() {
            eprintln!("\nBuild the index first: genizah-search index -i <corpus> -o <dir>");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(index) = cli.index {
        config.index.path = index;
    }

    match cli.command {
        Commands::Index {
            input,
            output,
            keep_line_numbers,
            batch_size,
            quiet,
        } => {
            let output = output.unwrap_or_else(|| config.index.path.clone());
            let mut options = config.index.build_options();
            if keep_line_numbers {
                options.strip_line_numbers = false;
            }
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }

            let mut progress = ConsoleProgress::default();
            let sink: Option<&mut dyn ProgressSink> = if quiet { None } else { Some(&mut progress) };
            let report = build(&output, &input, &options, sink)
                .with_context(|| format!("Failed to build index from {}", input.display()))?;

            if !quiet {
                println!("Index created at {}", output.display());
                println!("Documents: {}", report.document_count);
                if report.pruned > 0 {
                    println!("Removed stale documents: {}", report.pruned);
                }
                println!("Index size: {:.2} MB", directory_size(&output) as f64 / (1024.0 * 1024.0));
            }
            Ok(())
        }
        Commands::Search {
            query,
            search_type,
            limit,
            no_highlights,
            full,
            annotations,
            min_lines,
            max_lines,
            json,
        } => {
            let searcher = open_searcher(&config)?;
            let has_filters =
                annotations.as_filter().is_some() || min_lines.is_some() || max_lines.is_some();

            let query = if has_filters {
                Query::Advanced(AdvancedQuery {
                    text: Some(query),
                    has_annotations: annotations.as_filter(),
                    min_line_count: min_lines,
                    max_line_count: max_lines,
                })
            } else {
                let mode = match search_type {
                    SearchType::Fulltext => QueryMode::Fulltext,
                    SearchType::Docid => QueryMode::DocId,
                    SearchType::Regex => QueryMode::Regex,
                };
                match Query::from_mode(mode, query) {
                    Query::Fulltext { text, .. } => Query::Fulltext {
                        text,
                        with_highlights: !no_highlights,
                    },
                    other => other,
                }
            };

            let results = searcher.search(&query, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results, full, !no_highlights);
            }
            Ok(())
        }
        Commands::Stats { json } => {
            let stats = open_searcher(&config)?.statistics()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_statistics(&stats);
            }
            Ok(())
        }
        Commands::Show { id } => {
            let searcher = open_searcher(&config)?;
            let hit = searcher
                .get_document(&id)?
                .with_context(|| format!("No document with id '{}'", id))?;
            print_hit(&hit);
            println!("\n{}", hit.content);
            Ok(())
        }
    }
}

fn open_searcher(config: &Config) -> Result<Searcher> {
    let store = IndexStore::open(&config.index.path)?;
    Ok(Searcher::new(store, config.search.clone()))
}

fn print_results(results: &SearchResults, full: bool, show_highlights: bool) {
    if results.is_empty() {
        println!("\nNo results found.");
        return;
    }

    println!("\nFound {} result(s) in {:?}:\n", results.len(), results.elapsed);
    if results.truncated {
        println!(
            "(scan stopped early after {} documents)\n",
            results.documents_scanned
        );
    }
    for (i, hit) in results.hits.iter().enumerate() {
        println!("--- Result {} ---", i + 1);
        print_hit(hit);
        println!("Relevance Score: {:.2}", hit.score);

        if full {
            println!("\nContent:");
            println!("{}", truncate_chars(&hit.content, FULL_CONTENT_CHARS));
        } else if show_highlights && let Some(snippet) = &hit.highlight {
            println!("\nSnippet:");
            println!("{}", snippet);
        }
        println!();
    }
}

fn print_hit(hit: &SearchHit) {
    println!("Document ID: {}", hit.id);
    println!("Lines: {}", hit.line_count);
    println!(
        "Has Annotations: {}",
        if hit.has_annotations { "Yes" } else { "No" }
    );
}

fn print_statistics(stats: &IndexStatistics) {
    println!("\n=== Index Statistics ===\n");
    println!("State: {}", stats.state);
    println!("Total Documents: {}", stats.total_documents);
    println!(
        "Documents with Annotations: {}",
        stats.documents_with_annotations
    );
    println!(
        "Percentage with Annotations: {:.1}%",
        stats.annotation_percentage()
    );
    println!("Segments: {}", stats.segment_count);
    if let Some(last_updated) = stats.last_updated {
        println!("Last Updated: {}", last_updated.to_rfc3339());
    }
    println!();
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

fn directory_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => directory_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

/// Prints build progress on stderr.
#[derive(Default)]
struct ConsoleProgress {
    last_percent: Option<usize>,
}

impl ProgressSink for ConsoleProgress {
    fn started(&mut self, total: usize) {
        eprintln!("Found {} documents", total);
    }

    fn batch_committed(&mut self, indexed: usize, total: usize) {
        let percent = (indexed * 100).checked_div(total).unwrap_or(100);
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            eprint!("\rIndexing: {}% ({}/{})", percent, indexed, total);
            let _ = std::io::stderr().flush();
        }
    }

    fn optimizing(&mut self) {
        eprintln!("\nOptimizing index...");
    }

    fn finished(&mut self, report: &BuildReport) {
        eprintln!(
            "Indexed {} documents in {} batches ({:.1}s)",
            report.document_count,
            report.batches,
            report.duration.as_secs_f64()
        );
    }
}
