mod common;

use assert2::check;
use common::{GENIZAH_CORPUS, SCENARIO_CORPUS, TempWorkspace};
use genizah_search::{CorpusParser, DocumentDraft, SearchError};
use rstest::rstest;

fn parse_file(corpus: &str, strip: bool) -> Vec<DocumentDraft> {
    let workspace = TempWorkspace::new();
    let path = workspace.create_file("corpus.txt", corpus);
    CorpusParser::new(path)
        .strip_line_numbers(strip)
        .parse()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn scenario_corpus_from_file() {
    let drafts = parse_file(SCENARIO_CORPUS, true);
    check!(drafts.len() == 2);

    check!(drafts[0].id == "D1");
    check!(drafts[0].content == "hello world");
    check!(drafts[0].line_count == 1);
    check!(drafts[1].id == "D2");
    check!(drafts[1].content == "foo bar");
    check!(drafts[1].line_count == 1);
}

#[test]
fn genizah_fragments_keep_ids_and_markers() {
    let drafts = parse_file(GENIZAH_CORPUS, true);
    let summary: Vec<(&str, u32, bool)> = drafts
        .iter()
        .map(|d| (d.id.as_str(), d.line_count, d.has_annotations))
        .collect();

    check!(
        summary
            == vec![
                ("990000412990205171_IE104549337_P000001", 3, true),
                ("990000412990205171_IE104549337_P000002", 1, false),
                ("T-S 10J5.1", 4, true),
                ("T-S 12.120", 2, false),
                ("ENA 2556.3", 5, false),
            ]
    );
    check!(drafts[2].content.starts_with("כתאב אלי מולאי\n"));
    check!(!drafts.iter().any(|d| d.content.contains('→')));
}

#[test]
fn line_numbers_survive_when_kept() {
    let drafts = parse_file(SCENARIO_CORPUS, false);
    check!(drafts[0].content == "1→hello world");
}

#[rstest]
#[case("", 0)]
#[case("no header at all\n", 0)]
#[case("==> only <==", 1)]
#[case("==> A <==\r\nalpha\r\n==> B <==\r\n", 2)]
#[case(GENIZAH_CORPUS, 5)]
fn count_agrees_with_parse(#[case] corpus: &str, #[case] expected: usize) {
    let workspace = TempWorkspace::new();
    let path = workspace.create_file("corpus.txt", corpus);
    let parser = CorpusParser::new(path);

    check!(parser.count_documents().unwrap() == expected);
    check!(parser.parse().unwrap().count() == expected);
}

#[test]
fn parse_can_be_restarted() {
    let workspace = TempWorkspace::new();
    let path = workspace.create_file("corpus.txt", GENIZAH_CORPUS);
    let parser = CorpusParser::new(path);

    let first: Vec<String> = parser.parse().unwrap().map(|d| d.unwrap().id).collect();
    let second: Vec<String> = parser.parse().unwrap().map(|d| d.unwrap().id).collect();
    check!(first == second);
}

#[test]
fn missing_file_is_source_unreadable() {
    let workspace = TempWorkspace::new();
    let parser = CorpusParser::new(workspace.path().join("absent.txt"));

    check!(let Err(SearchError::SourceUnreadable { .. }) = parser.parse());
    check!(let Err(SearchError::SourceUnreadable { .. }) = parser.count_documents());
}

#[test]
fn invalid_bytes_stop_the_stream() {
    let workspace = TempWorkspace::new();
    let mut corpus = b"==> A <==\nalpha\n==> B <==\n".to_vec();
    corpus.extend_from_slice(&[0xfe, 0xff, b'\n']);
    let path = workspace.create_file("corpus.txt", &corpus);

    let mut drafts = CorpusParser::new(path).parse().unwrap();
    check!(drafts.next().unwrap().unwrap().id == "A");
    check!(let Some(Err(SearchError::ParseError { line: 4, .. })) = drafts.next());
}
