//! Query execution over an [`IndexStore`].

use crate::error::{Result, SearchError};
use crate::search::highlight::{HighlightOptions, highlight};
use crate::search::index::{DocOrd, IndexReader, InvertedIndex};
use crate::search::query::{self, QueryNode};
use crate::search::scoring::{Bm25Params, CorpusStats};
use crate::store::IndexStore;
use crate::types::{IndexStatistics, SearchHit, SearchResults};
use ahash::AHashMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// The four query modes, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Fulltext,
    DocId,
    Regex,
    Advanced,
}

impl FromStr for QueryMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fulltext" => Ok(Self::Fulltext),
            "docid" => Ok(Self::DocId),
            "regex" => Ok(Self::Regex),
            "advanced" => Ok(Self::Advanced),
            other => Err(SearchError::invalid_query(format!(
                "unknown query mode '{}' (expected fulltext, docid, regex or advanced)",
                other
            ))),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fulltext => "fulltext",
            Self::DocId => "docid",
            Self::Regex => "regex",
            Self::Advanced => "advanced",
        })
    }
}

/// Safety valve for regex scans. Unset fields impose no limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanBudget {
    pub max_documents: Option<usize>,
    /// Wall-clock allowance measured from the start of the query.
    pub deadline: Option<Duration>,
}

impl ScanBudget {
    pub const UNLIMITED: Self = Self {
        max_documents: None,
        deadline: None,
    };

    /// Fills unset fields from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            max_documents: self.max_documents.or(fallback.max_documents),
            deadline: self.deadline.or(fallback.deadline),
        }
    }

    fn exhausted(&self, scanned: usize, start: Instant) -> bool {
        self.max_documents.is_some_and(|max| scanned >= max)
            || self.deadline.is_some_and(|deadline| start.elapsed() >= deadline)
    }
}

/// Full-text clause combined with structural predicates by AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedQuery {
    pub text: Option<String>,
    pub has_annotations: Option<bool>,
    pub min_line_count: Option<u32>,
    pub max_line_count: Option<u32>,
}

impl AdvancedQuery {
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_line_count, self.max_line_count)
            && min > max
        {
            return Err(SearchError::invalid_query(format!(
                "min_line_count {} is greater than max_line_count {}",
                min, max
            )));
        }
        Ok(())
    }

    fn text_clause(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.trim().is_empty())
    }

    fn has_line_range(&self) -> bool {
        self.min_line_count.is_some() || self.max_line_count.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Fulltext { text: String, with_highlights: bool },
    DocId { pattern: String },
    Regex { pattern: String, budget: ScanBudget },
    Advanced(AdvancedQuery),
}

impl Query {
    /// Builds a query of `mode` from a plain query string.
    pub fn from_mode(mode: QueryMode, text: impl Into<String>) -> Self {
        let text = text.into();
        match mode {
            QueryMode::Fulltext => Self::Fulltext {
                text,
                with_highlights: true,
            },
            QueryMode::DocId => Self::DocId { pattern: text },
            QueryMode::Regex => Self::Regex {
                pattern: text,
                budget: ScanBudget::default(),
            },
            QueryMode::Advanced => Self::Advanced(AdvancedQuery {
                text: Some(text),
                ..AdvancedQuery::default()
            }),
        }
    }

    pub fn mode(&self) -> QueryMode {
        match self {
            Self::Fulltext { .. } => QueryMode::Fulltext,
            Self::DocId { .. } => QueryMode::DocId,
            Self::Regex { .. } => QueryMode::Regex,
            Self::Advanced(_) => QueryMode::Advanced,
        }
    }
}

/// Regex scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexSettings {
    /// Upper bound on compiled program size, in bytes.
    pub size_limit: usize,
    pub max_documents: Option<usize>,
    pub timeout_ms: Option<u64>,
}

impl Default for RegexSettings {
    fn default() -> Self {
        Self {
            size_limit: 10 * (1 << 20),
            max_documents: None,
            timeout_ms: None,
        }
    }
}

impl RegexSettings {
    pub fn budget(&self) -> ScanBudget {
        ScanBudget {
            max_documents: self.max_documents,
            deadline: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Tuning of the query engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub bm25: Bm25Params,
    pub highlight: HighlightOptions,
    pub regex: RegexSettings,
}

/// Executes queries against the latest committed state of an index.
///
/// Every call takes a fresh snapshot, so a `Searcher` kept open during a
/// build sees each batch as soon as it commits.
#[derive(Debug)]
pub struct Searcher {
    store: IndexStore,
    settings: SearchSettings,
}

impl Searcher {
    /// Opens the index at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(IndexStore::open(path)?, SearchSettings::default()))
    }

    pub fn new(store: IndexStore, settings: SearchSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Runs any query, returning at most `limit` hits.
    #[tracing::instrument(skip(self, query), fields(mode = %query.mode()))]
    pub fn search(&self, query: &Query, limit: usize) -> Result<SearchResults> {
        let start = Instant::now();
        let snapshot = self.store.snapshot()?;
        let index = snapshot.index();

        let mut results = match query {
            Query::Fulltext {
                text,
                with_highlights,
            } => self.run_fulltext(index, text, limit, *with_highlights)?,
            Query::DocId { pattern } => run_doc_id(index, pattern, limit)?,
            Query::Regex { pattern, budget } => self.run_regex(index, pattern, limit, *budget, start)?,
            Query::Advanced(advanced) => self.run_advanced(index, advanced, limit)?,
        };
        results.elapsed = start.elapsed();

        tracing::debug!(
            "{} hits, {} documents scanned in {:?}",
            results.hits.len(),
            results.documents_scanned,
            results.elapsed
        );
        Ok(results)
    }

    pub fn fulltext(&self, text: &str, limit: usize, with_highlights: bool) -> Result<SearchResults> {
        self.search(
            &Query::Fulltext {
                text: text.to_string(),
                with_highlights,
            },
            limit,
        )
    }

    pub fn doc_id(&self, pattern: &str, limit: usize) -> Result<SearchResults> {
        self.search(
            &Query::DocId {
                pattern: pattern.to_string(),
            },
            limit,
        )
    }

    /// Scans every document in store order. Cost grows with the corpus.
    pub fn regex(&self, pattern: &str, limit: usize, budget: ScanBudget) -> Result<SearchResults> {
        self.search(
            &Query::Regex {
                pattern: pattern.to_string(),
                budget,
            },
            limit,
        )
    }

    pub fn advanced(&self, query: &AdvancedQuery, limit: usize) -> Result<SearchResults> {
        self.search(&Query::Advanced(query.clone()), limit)
    }

    /// Looks up one document by exact id.
    pub fn get_document(&self, id: &str) -> Result<Option<SearchHit>> {
        let snapshot = self.store.snapshot()?;
        let index = snapshot.index();
        Ok(index
            .lookup(id)
            .and_then(|doc| index.document(doc))
            .map(|doc| SearchHit::from_document(doc, SearchHit::UNRANKED, None)))
    }

    pub fn statistics(&self) -> Result<IndexStatistics> {
        let snapshot = self.store.snapshot()?;
        let index = snapshot.index();
        Ok(IndexStatistics {
            total_documents: index.document_count(),
            documents_with_annotations: index.annotation_filter(true).len(),
            last_updated: snapshot.metadata().last_updated,
            state: snapshot.state(),
            segment_count: snapshot.segment_count(),
        })
    }

    fn run_fulltext(
        &self,
        index: &InvertedIndex,
        text: &str,
        limit: usize,
        with_highlights: bool,
    ) -> Result<SearchResults> {
        let node = query::parse(text)?;
        let (ranked, scanned) = self.rank(index, &node, |_| true);
        let matchers = if with_highlights {
            node.highlight_matchers()
        } else {
            Vec::new()
        };

        let hits = ranked
            .into_iter()
            .take(limit)
            .filter_map(|(doc, score)| {
                let document = index.document(doc)?;
                let snippet = with_highlights
                    .then(|| highlight(&document.content, &matchers, &self.settings.highlight))
                    .flatten();
                Some(SearchHit::from_document(document, score, snippet))
            })
            .collect();

        Ok(SearchResults {
            hits,
            documents_scanned: scanned,
            ..SearchResults::default()
        })
    }

    /// Candidates of `node` accepted by `keep`, best first, ties by id.
    fn rank(
        &self,
        index: &InvertedIndex,
        node: &QueryNode,
        keep: impl Fn(DocOrd) -> bool,
    ) -> (Vec<(DocOrd, f32)>, usize) {
        let candidates = node.matches(index);
        let scanned = candidates.len();
        let mut scores: AHashMap<DocOrd, f32> = candidates
            .into_iter()
            .filter(|&doc| keep(doc))
            .map(|doc| (doc, 0.0))
            .collect();

        let stats = CorpusStats {
            document_count: index.document_count(),
            average_length: index.average_document_length(),
        };
        for leaf in node.positive_leaves() {
            let frequencies = leaf.frequencies(index);
            let df = frequencies.len();
            for (doc, tf) in frequencies {
                if let Some(score) = scores.get_mut(&doc) {
                    *score += self
                        .settings
                        .bm25
                        .score(tf, index.document_length(doc), df, stats);
                }
            }
        }

        let mut ranked: Vec<(DocOrd, f32)> = scores.into_iter().collect();
        ranked.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| id_of(index, *a).cmp(id_of(index, *b)))
        });
        (ranked, scanned)
    }

    fn run_regex(
        &self,
        index: &InvertedIndex,
        pattern: &str,
        limit: usize,
        budget: ScanBudget,
        start: Instant,
    ) -> Result<SearchResults> {
        let regex = RegexBuilder::new(pattern)
            .size_limit(self.settings.regex.size_limit)
            .build()
            .map_err(|e| SearchError::invalid_query(format!("invalid regex: {}", e)))?;
        let budget = budget.or(self.settings.regex.budget());

        let mut results = SearchResults::default();
        if limit == 0 {
            return Ok(results);
        }
        for (_, document) in index.scan() {
            if budget.exhausted(results.documents_scanned, start) {
                results.truncated = true;
                tracing::warn!(
                    "Regex scan stopped after {} of {} documents",
                    results.documents_scanned,
                    index.document_count()
                );
                break;
            }
            results.documents_scanned += 1;
            if regex.is_match(&document.content) {
                results
                    .hits
                    .push(SearchHit::from_document(document, SearchHit::UNRANKED, None));
                if results.hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    fn run_advanced(
        &self,
        index: &InvertedIndex,
        query: &AdvancedQuery,
        limit: usize,
    ) -> Result<SearchResults> {
        query.validate()?;
        let annotated = query.has_annotations.map(|flag| index.annotation_filter(flag));
        let lines = query
            .has_line_range()
            .then(|| index.line_count_filter(query.min_line_count, query.max_line_count));
        let accepts = |doc: DocOrd| {
            annotated.is_none_or(|set| set.contains(&doc))
                && lines.as_ref().is_none_or(|set| set.contains(&doc))
        };

        if let Some(text) = query.text_clause() {
            let node = query::parse(text)?;
            let (ranked, scanned) = self.rank(index, &node, accepts);
            let hits = ranked
                .into_iter()
                .take(limit)
                .filter_map(|(doc, score)| {
                    index
                        .document(doc)
                        .map(|document| SearchHit::from_document(document, score, None))
                })
                .collect();
            return Ok(SearchResults {
                hits,
                documents_scanned: scanned,
                ..SearchResults::default()
            });
        }

        let matching: BTreeSet<DocOrd> = match (annotated, &lines) {
            (Some(a), Some(l)) => a.intersection(l).copied().collect(),
            (Some(a), None) => a.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => index.scan().map(|(doc, _)| doc).collect(),
        };
        let mut ordered: Vec<(&str, DocOrd)> = matching
            .iter()
            .map(|&doc| (id_of(index, doc), doc))
            .collect();
        ordered.sort_unstable();

        let hits = ordered
            .into_iter()
            .take(limit)
            .filter_map(|(_, doc)| index.document(doc))
            .map(|document| SearchHit::from_document(document, SearchHit::UNRANKED, None))
            .collect();
        Ok(SearchResults {
            hits,
            documents_scanned: matching.len(),
            ..SearchResults::default()
        })
    }
}

fn id_of(index: &InvertedIndex, doc: DocOrd) -> &str {
    index.document(doc).map_or("", |document| document.id.as_str())
}

/// Id search: wildcard pattern when `*` or `?` is present, substring test otherwise.
/// Both are case-insensitive. Results are in lexicographic id order.
fn run_doc_id(index: &InvertedIndex, pattern: &str, limit: usize) -> Result<SearchResults> {
    let matcher = IdMatcher::new(pattern)?;
    let mut results = SearchResults::default();

    for (id, doc) in index.ids() {
        if results.hits.len() >= limit {
            break;
        }
        results.documents_scanned += 1;
        if matcher.matches(id)
            && let Some(document) = index.document(doc)
        {
            results
                .hits
                .push(SearchHit::from_document(document, SearchHit::UNRANKED, None));
        }
    }
    Ok(results)
}

enum IdMatcher {
    Wildcard(Regex),
    Contains(String),
}

impl IdMatcher {
    fn new(pattern: &str) -> Result<Self> {
        if !pattern.contains(['*', '?']) {
            return Ok(Self::Contains(pattern.to_lowercase()));
        }

        let mut expr = String::from("^");
        let mut literal = String::new();
        for c in pattern.chars() {
            match c {
                '*' | '?' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();
                    expr.push_str(if c == '*' { ".*" } else { "." });
                }
                _ => literal.push(c),
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        RegexBuilder::new(&expr)
            .case_insensitive(true)
            .build()
            .map(Self::Wildcard)
            .map_err(|e| SearchError::invalid_query(format!("invalid id pattern: {}", e)))
    }

    fn matches(&self, id: &str) -> bool {
        match self {
            Self::Wildcard(regex) => regex.is_match(id),
            Self::Contains(needle) => id.to_lowercase().contains(needle.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use rstest::rstest;

    #[rstest]
    #[case("fulltext", QueryMode::Fulltext)]
    #[case("DocId", QueryMode::DocId)]
    #[case("regex", QueryMode::Regex)]
    #[case("advanced", QueryMode::Advanced)]
    fn test_mode_from_str(#[case] tag: &str, #[case] expected: QueryMode) {
        check!(tag.parse::<QueryMode>().unwrap() == expected);
    }

    #[test]
    fn test_unknown_mode_is_invalid_query() {
        check!(let Err(SearchError::InvalidQuery(_)) = "fuzzy".parse::<QueryMode>());
    }

    #[rstest]
    #[case("T-S*", "T-S 10J5.1", true)]
    #[case("t-s*", "T-S 10J5.1", true)]
    #[case("T-S 1?J*", "T-S 10J5.1", true)]
    #[case("T-S 1?J", "T-S 10J5.1", false)]
    #[case("*5.1", "T-S 10J5.1", true)]
    #[case("*.1", "T-S 10J5x1", false)]
    #[case("10j", "T-S 10J5.1", true)]
    #[case("", "anything", true)]
    #[case("IE104", "990000412990205171_IE104549337_P000001", true)]
    fn test_id_matcher(#[case] pattern: &str, #[case] id: &str, #[case] expected: bool) {
        check!(IdMatcher::new(pattern).unwrap().matches(id) == expected);
    }

    #[test]
    fn test_budget_fallback() {
        let configured = ScanBudget {
            max_documents: Some(10),
            deadline: Some(Duration::from_secs(1)),
        };
        let query = ScanBudget {
            max_documents: Some(3),
            deadline: None,
        };
        let merged = query.or(configured);
        check!(merged.max_documents == Some(3));
        check!(merged.deadline == Some(Duration::from_secs(1)));
        check!(ScanBudget::UNLIMITED.or(ScanBudget::UNLIMITED) == ScanBudget::default());
    }

    #[test]
    fn test_advanced_validation() {
        let inverted = AdvancedQuery {
            min_line_count: Some(5),
            max_line_count: Some(2),
            ..AdvancedQuery::default()
        };
        check!(let Err(SearchError::InvalidQuery(_)) = inverted.validate());

        let blank_text = AdvancedQuery {
            text: Some("   ".to_string()),
            ..AdvancedQuery::default()
        };
        check!(blank_text.text_clause().is_none());
    }
}
