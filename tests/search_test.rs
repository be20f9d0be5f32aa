mod common;

use assert2::check;
use common::{BuiltIndex, genizah_index, scenario_index};
use genizah_search::corpus::has_annotations;
use genizah_search::{AdvancedQuery, IndexState, Query, QueryMode, ScanBudget, SearchError};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

const P1: &str = "990000412990205171_IE104549337_P000001";
const P2: &str = "990000412990205171_IE104549337_P000002";
const TS_LETTER: &str = "T-S 10J5.1";
const TS_BLESSING: &str = "T-S 12.120";
const ENA: &str = "ENA 2556.3";

// --- Scenarios on the two-document corpus ---

#[rstest]
fn fulltext_finds_single_document_with_highlight(scenario_index: BuiltIndex) {
    let results = scenario_index.searcher.fulltext("hello", 10, true).unwrap();
    check!(results.ids() == vec!["D1"]);

    let highlight = results.hits[0].highlight.as_deref().unwrap();
    check!(highlight.contains("hello"));
    check!(highlight == "<b>hello</b> world");
    check!(results.hits[0].score > 0.0);
}

#[rstest]
fn doc_id_contains_respects_limit_and_order(scenario_index: BuiltIndex) {
    let one = scenario_index.searcher.doc_id("D", 1).unwrap();
    check!(one.len() == 1);

    let both = scenario_index.searcher.doc_id("D", 10).unwrap();
    check!(both.ids() == vec!["D1", "D2"]);
    check!(both.hits.iter().all(|hit| hit.score == 1.0 && hit.highlight.is_none()));
}

#[rstest]
fn regex_matches_only_d2(scenario_index: BuiltIndex) {
    let results = scenario_index
        .searcher
        .regex(r"foo \w+", 10, ScanBudget::default())
        .unwrap();
    check!(results.ids() == vec!["D2"]);
    check!(results.hits[0].score == 1.0);
    check!(results.hits[0].highlight.is_none());
    check!(!results.truncated);
}

#[rstest]
fn bad_regex_is_invalid_query(scenario_index: BuiltIndex) {
    let result = scenario_index
        .searcher
        .regex("[unterminated", 10, ScanBudget::default());
    check!(let Err(SearchError::InvalidQuery(_)) = result);
}

// --- Full-text syntax and ranking ---

#[rstest]
#[case("שבת", &[P2])]
#[case("שבת שלום", &[P2])]
#[case("שבת AND ברוך", &[])]
#[case("שלום OR ברוך", &[P2, TS_BLESSING])]
#[case("\"ביום השבת\"", &[ENA])]
#[case("\"השבת ביום\"", &[])]
#[case("אלשבת", &[P1])]
#[case("⟦ותגי", &[P1])]
fn fulltext_syntax(genizah_index: BuiltIndex, #[case] query: &str, #[case] expected: &[&str]) {
    let mut ids = genizah_index.searcher.fulltext(query, 10, false).unwrap().ids()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    ids.sort();
    let mut expected: Vec<String> = expected.iter().map(|id| (*id).to_string()).collect();
    expected.sort();
    check!(ids == expected);
}

#[rstest]
fn prefix_and_exclusion(genizah_index: BuiltIndex) {
    let mut prefixed = genizah_index.searcher.fulltext("שבת*", 10, false).unwrap().ids()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    prefixed.sort();
    check!(prefixed == vec![P2.to_string(), ENA.to_string()]);

    let excluded = genizah_index.searcher.fulltext("שבת* NOT שלום", 10, false).unwrap();
    check!(excluded.ids() == vec![ENA]);
}

#[rstest]
#[case("")]
#[case("NOT שבת")]
#[case("שבת OR")]
#[case("(שבת")]
fn malformed_fulltext_is_invalid_query(genizah_index: BuiltIndex, #[case] query: &str) {
    check!(let Err(SearchError::InvalidQuery(_)) = genizah_index.searcher.fulltext(query, 10, true));
}

#[test]
fn bm25_prefers_short_and_frequent_matches() {
    let built = BuiltIndex::new(
        "==> long <==\nneedle a b c d e f g h\n\
         ==> short <==\nneedle\n\
         ==> twice <==\nneedle needle x y z w v u t\n\
         ==> other <==\nhay\n",
        10,
    );
    let results = built.searcher.fulltext("needle", 10, false).unwrap();
    check!(results.ids() == vec!["short", "twice", "long"]);
    check!(results.hits.windows(2).all(|w| w[0].score >= w[1].score));
    check!(results.documents_scanned == 3);

    let truncated = built.searcher.fulltext("needle", 2, false).unwrap();
    check!(truncated.ids() == vec!["short", "twice"]);
    check!(built.searcher.fulltext("needle", 0, false).unwrap().is_empty());
}

#[test]
fn equal_scores_break_ties_by_id() {
    let built = BuiltIndex::new("==> b <==\nsame\n==> c <==\nsame\n==> a <==\nsame\n", 10);
    let results = built.searcher.fulltext("same", 10, false).unwrap();
    check!(results.ids() == vec!["a", "b", "c"]);
}

#[test]
fn gershayim_abbreviations_are_searchable() {
    let built = BuiltIndex::new(
        "==> abbrev <==\nכתב ר\"ת ז\"ל בזה\n==> plain <==\nרת זל\n",
        10,
    );
    let searcher = &built.searcher;

    let results = searcher.fulltext("ר\"ת", 10, true).unwrap();
    check!(results.ids() == vec!["abbrev"]);
    check!(results.hits[0].highlight.as_deref() == Some("כתב <b>ר\"ת</b> ז\"ל בזה"));

    check!(searcher.fulltext("ר\"ת ז\"ל", 10, false).unwrap().ids() == vec!["abbrev"]);
    check!(searcher.fulltext("\"ר\"ת ז\"ל\"", 10, false).unwrap().ids() == vec!["abbrev"]);
    check!(searcher.fulltext("ז\"ל*", 10, false).unwrap().ids() == vec!["abbrev"]);
    check!(searcher.fulltext("רת", 10, false).unwrap().ids() == vec!["plain"]);
}

#[rstest]
fn phrase_highlight_marks_the_adjacent_run(genizah_index: BuiltIndex) {
    let results = genizah_index.searcher.fulltext("\"ביום השבת\"", 10, true).unwrap();
    check!(results.ids() == vec![ENA]);
    check!(results.hits[0].highlight.as_deref().unwrap().contains("<b>ביום השבת</b>"));
}

#[rstest]
fn highlights_only_when_requested(genizah_index: BuiltIndex) {
    let with = genizah_index.searcher.fulltext("שבת", 10, true).unwrap();
    check!(with.hits[0].highlight.as_deref() == Some("<b>שבת</b> שלום ומבורך"));

    let without = genizah_index.searcher.fulltext("שבת", 10, false).unwrap();
    check!(without.hits[0].highlight.is_none());
}

// --- Document ids ---

#[rstest]
#[case("T-S*", &[TS_LETTER, TS_BLESSING])]
#[case("*P00000?", &[P1, P2])]
#[case("ie104549337", &[P1, P2])]
#[case("t-s 1", &[TS_LETTER, TS_BLESSING])]
#[case("T-S 1?.120", &[TS_BLESSING])]
#[case("Bodl.*", &[])]
fn doc_id_patterns(genizah_index: BuiltIndex, #[case] pattern: &str, #[case] expected: &[&str]) {
    check!(genizah_index.searcher.doc_id(pattern, 10).unwrap().ids() == expected);
}

// --- Regex scans ---

#[rstest]
fn regex_scans_in_store_order(genizah_index: BuiltIndex) {
    let results = genizah_index
        .searcher
        .regex("ייי|ביום", 10, ScanBudget::default())
        .unwrap();
    check!(results.ids() == vec![TS_BLESSING, ENA]);
    check!(results.documents_scanned == 5);

    let limited = genizah_index
        .searcher
        .regex("ייי|ביום", 1, ScanBudget::default())
        .unwrap();
    check!(limited.ids() == vec![TS_BLESSING]);
}

#[rstest]
fn regex_budget_stops_scan(genizah_index: BuiltIndex) {
    let capped = ScanBudget {
        max_documents: Some(2),
        deadline: None,
    };
    let results = genizah_index.searcher.regex(".", 10, capped).unwrap();
    check!(results.ids() == vec![P1, P2]);
    check!(results.documents_scanned == 2);
    check!(results.truncated);

    let expired = ScanBudget {
        max_documents: None,
        deadline: Some(Duration::ZERO),
    };
    let results = genizah_index.searcher.regex(".", 10, expired).unwrap();
    check!(results.is_empty());
    check!(results.truncated);
}

// --- Advanced ---

#[rstest]
fn annotation_filter_partitions_corpus(genizah_index: BuiltIndex) {
    let searcher = &genizah_index.searcher;
    let all = searcher.doc_id("", 100).unwrap();
    check!(all.len() == 5);

    let annotated = searcher
        .advanced(
            &AdvancedQuery {
                has_annotations: Some(true),
                ..AdvancedQuery::default()
            },
            100,
        )
        .unwrap();
    let plain = searcher
        .advanced(
            &AdvancedQuery {
                has_annotations: Some(false),
                ..AdvancedQuery::default()
            },
            100,
        )
        .unwrap();

    let expected_annotated: Vec<&str> = all
        .hits
        .iter()
        .filter(|hit| has_annotations(&hit.content))
        .map(|hit| hit.id.as_str())
        .collect();
    let expected_plain: Vec<&str> = all
        .hits
        .iter()
        .filter(|hit| !has_annotations(&hit.content))
        .map(|hit| hit.id.as_str())
        .collect();

    check!(annotated.ids() == expected_annotated);
    check!(plain.ids() == expected_plain);
    check!(annotated.ids() == vec![P1, TS_LETTER]);
    check!(annotated.len() + plain.len() == all.len());
}

#[rstest]
#[case(Some(3), None, &[P1, ENA, TS_LETTER])]
#[case(None, Some(2), &[P2, TS_BLESSING])]
#[case(Some(2), Some(4), &[P1, TS_LETTER, TS_BLESSING])]
#[case(Some(6), None, &[])]
fn line_count_range(
    genizah_index: BuiltIndex,
    #[case] min: Option<u32>,
    #[case] max: Option<u32>,
    #[case] expected: &[&str],
) {
    let query = AdvancedQuery {
        min_line_count: min,
        max_line_count: max,
        ..AdvancedQuery::default()
    };
    let results = genizah_index.searcher.advanced(&query, 10).unwrap();
    check!(results.ids() == expected);
    check!(results.hits.iter().all(|hit| hit.score == 1.0));
}

#[rstest]
fn inverted_line_range_is_invalid(genizah_index: BuiltIndex) {
    let query = AdvancedQuery {
        min_line_count: Some(5),
        max_line_count: Some(1),
        ..AdvancedQuery::default()
    };
    check!(let Err(SearchError::InvalidQuery(_)) = genizah_index.searcher.advanced(&query, 10));
}

#[rstest]
fn text_clause_is_filtered_before_truncation(genizah_index: BuiltIndex) {
    let query = AdvancedQuery {
        text: Some("שבת*".to_string()),
        max_line_count: Some(1),
        ..AdvancedQuery::default()
    };
    let results = genizah_index.searcher.advanced(&query, 1).unwrap();
    check!(results.ids() == vec![P2]);
    check!(results.hits[0].highlight.is_none());
    check!(results.hits[0].score > 0.0);

    let annotated_text = AdvancedQuery {
        text: Some("אללסאן".to_string()),
        has_annotations: Some(false),
        ..AdvancedQuery::default()
    };
    check!(genizah_index.searcher.advanced(&annotated_text, 10).unwrap().is_empty());
}

#[rstest]
fn empty_advanced_query_lists_everything(genizah_index: BuiltIndex) {
    let results = genizah_index
        .searcher
        .advanced(&AdvancedQuery::default(), 10)
        .unwrap();
    check!(results.ids() == vec![P1, P2, ENA, TS_LETTER, TS_BLESSING]);
}

// --- Modes, documents and statistics ---

#[rstest]
fn mode_tags_dispatch(genizah_index: BuiltIndex) {
    let mode: QueryMode = "docid".parse().unwrap();
    let results = genizah_index
        .searcher
        .search(&Query::from_mode(mode, "ENA"), 10)
        .unwrap();
    check!(results.ids() == vec![ENA]);

    check!(let Err(SearchError::InvalidQuery(_)) = "semantic".parse::<QueryMode>());
}

#[rstest]
fn statistics_reflect_the_corpus(genizah_index: BuiltIndex) {
    let stats = genizah_index.searcher.statistics().unwrap();
    check!(stats.total_documents == 5);
    check!(stats.documents_with_annotations == 2);
    check!(stats.annotation_percentage() == 40.0);
    check!(stats.last_updated.is_some());
    check!(stats.state == IndexState::Ready);
    check!(stats.segment_count == 1);
}

#[rstest]
fn unknown_document_is_none(genizah_index: BuiltIndex) {
    check!(genizah_index.searcher.get_document("T-S 99").unwrap().is_none());
    check!(genizah_index.searcher.get_document(TS_LETTER).unwrap().is_some());
}

#[rstest]
fn concurrent_readers(genizah_index: BuiltIndex) {
    let BuiltIndex {
        workspace: _workspace,
        searcher,
        ..
    } = genizah_index;
    let searcher = Arc::new(searcher);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let searcher = Arc::clone(&searcher);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let hits = searcher.fulltext("שבת*", 10, true).unwrap();
                    assert_eq!(hits.len(), 2);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
