//! Parsing of transcription corpora into document drafts.
//!
//! A corpus is a UTF-8 text stream split into sections by header lines of the
//! exact form `==> <id> <==`. Everything up to the next header (or the end of
//! the stream) is the body of that document. Bodies may carry a line-number
//! prefix (`   12→`) on every line, which can be stripped while reading.

use crate::error::{Result, SearchError};
use crate::types::Document;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^==> (.+?) <==\s*$").expect("header pattern is valid"));

static LINE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+\d+→").expect("line number pattern is valid"));

/// Editorial insertion `⟦ ⟧` and damage `][` markers of the transcription convention.
static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"⟦|⟧|\]\[").expect("annotation pattern is valid"));

/// A parsed document before it is committed to an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDraft {
    pub id: String,
    pub content: String,
    pub line_count: u32,
    pub has_annotations: bool,
}

impl DocumentDraft {
    /// Builds a draft from the raw body lines of one section.
    pub fn from_lines(id: impl Into<String>, lines: &[String], strip_line_numbers: bool) -> Self {
        let lines: Vec<&str> = lines
            .iter()
            .map(|line| {
                if strip_line_numbers {
                    strip_line_number(line)
                } else {
                    line.as_str()
                }
            })
            .collect();

        let content = lines.join("\n").trim().to_string();
        let line_count = lines.iter().filter(|line| !line.trim().is_empty()).count() as u32;
        let has_annotations = has_annotations(&content);

        Self {
            id: id.into(),
            content,
            line_count,
            has_annotations,
        }
    }

    /// Stamps the draft with its commit time.
    pub fn into_document(self, created_at: DateTime<Utc>) -> Document {
        Document {
            id: self.id,
            content: self.content,
            line_count: self.line_count,
            has_annotations: self.has_annotations,
            created_at,
        }
    }
}

/// Returns the document id if `line` is a section header.
pub fn header_id(line: &str) -> Option<&str> {
    HEADER
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str())
}

/// Removes a leading `<spaces><digits>→` prefix, if present.
pub fn strip_line_number(line: &str) -> &str {
    match LINE_NUMBER.find(line) {
        Some(prefix) => &line[prefix.end()..],
        None => line,
    }
}

/// True if the text contains any annotation marker.
pub fn has_annotations(content: &str) -> bool {
    ANNOTATION.is_match(content)
}

/// Reads a corpus file. Each call to [`CorpusParser::parse`] reopens the file,
/// so the draft sequence can be restarted.
#[derive(Debug, Clone)]
pub struct CorpusParser {
    path: PathBuf,
    strip_line_numbers: bool,
}

impl CorpusParser {
    /// Creates a parser that strips line numbers.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strip_line_numbers: true,
        }
    }

    pub fn strip_line_numbers(mut self, strip: bool) -> Self {
        self.strip_line_numbers = strip;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the corpus and returns a lazy sequence of drafts.
    pub fn parse(&self) -> Result<Documents<BufReader<File>>> {
        let file = self.open()?;
        Ok(Documents::new(BufReader::new(file), self.strip_line_numbers).with_origin(&self.path))
    }

    /// Counts header lines without materializing any content.
    pub fn count_documents(&self) -> Result<usize> {
        let mut reader = BufReader::new(self.open()?);
        let mut buf = Vec::new();
        let mut count = 0;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| self.unreadable(source))?;
            if read == 0 {
                break;
            }
            // Headers are ASCII around the id; a lossy view is enough to recognise them.
            let line = String::from_utf8_lossy(&buf);
            if header_id(line.trim_end_matches(['\n', '\r'])).is_some() {
                count += 1;
            }
        }

        tracing::debug!("Counted {} documents in {}", count, self.path.display());
        Ok(count)
    }

    fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|source| self.unreadable(source))
    }

    fn unreadable(&self, source: io::Error) -> SearchError {
        SearchError::SourceUnreadable {
            path: self.path.clone(),
            source,
        }
    }
}

/// Parses drafts from any buffered reader.
pub fn parse_reader<R: BufRead>(reader: R, strip_line_numbers: bool) -> Documents<R> {
    Documents::new(reader, strip_line_numbers)
}

/// Lazy iterator over the drafts of one corpus stream.
///
/// Yields `Err` at most once; the iterator is exhausted afterwards.
#[derive(Debug)]
pub struct Documents<R> {
    lines: io::Lines<R>,
    strip_line_numbers: bool,
    origin: PathBuf,
    line_number: usize,
    current: Option<(String, Vec<String>)>,
    finished: bool,
}

impl<R: BufRead> Documents<R> {
    fn new(reader: R, strip_line_numbers: bool) -> Self {
        Self {
            lines: reader.lines(),
            strip_line_numbers,
            origin: PathBuf::from("<stream>"),
            line_number: 0,
            current: None,
            finished: false,
        }
    }

    fn with_origin(mut self, origin: &Path) -> Self {
        self.origin = origin.to_path_buf();
        self
    }

    fn emit(&self, id: String, lines: &[String]) -> DocumentDraft {
        DocumentDraft::from_lines(id, lines, self.strip_line_numbers)
    }

    fn fail(&mut self, source: io::Error) -> SearchError {
        self.finished = true;
        self.current = None;
        if source.kind() == io::ErrorKind::InvalidData {
            SearchError::ParseError {
                line: self.line_number + 1,
                message: source.to_string(),
            }
        } else {
            SearchError::SourceUnreadable {
                path: self.origin.clone(),
                source,
            }
        }
    }
}

impl<R: BufRead> Iterator for Documents<R> {
    type Item = Result<DocumentDraft>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.line_number += 1;
                    if let Some(id) = header_id(&line) {
                        let next = (id.to_string(), Vec::new());
                        if let Some((id, lines)) = self.current.replace(next) {
                            return Some(Ok(self.emit(id, &lines)));
                        }
                    } else if let Some((_, lines)) = self.current.as_mut() {
                        lines.push(line);
                    } else if !line.trim().is_empty() {
                        tracing::debug!(
                            "Skipping line {} of {}: content before the first header",
                            self.line_number,
                            self.origin.display()
                        );
                    }
                }
                Some(Err(source)) => return Some(Err(self.fail(source))),
                None => {
                    self.finished = true;
                    let (id, lines) = self.current.take()?;
                    return Some(Ok(self.emit(id, &lines)));
                }
            }
        }
    }
}
