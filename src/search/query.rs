//! Full-text query syntax.
//!
//! ```text
//! query   := or
//! or      := and ("OR" and)*
//! and     := not (["AND"] not)*
//! not     := primary ("NOT" primary)*
//! primary := word | word* | "quoted phrase" | "(" query ")"
//! ```
//!
//! Operators are recognised only in upper case; `and`, `or` and `not` are
//! ordinary words. `a NOT b` matches documents containing `a` but not `b`. A
//! word that segments into several tokens (`foo-bar`) is matched as a phrase.
//! A `"` opens a phrase only at the start of a word; inside a word it is
//! gershayim and stays part of the word (`ר"ת`), as it does when indexing.

use super::highlight::TermMatcher;
use super::index::{DocOrd, IndexReader, Posting};
use super::tokenize::tokenize;
use crate::error::{Result, SearchError};
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::vec::IntoIter;

/// Parsed full-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Term(String),
    Prefix(String),
    Phrase(Vec<String>),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not {
        include: Box<QueryNode>,
        exclude: Box<QueryNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    Leaf(QueryNode),
    And,
    Or,
    Not,
    Open,
    Close,
}

/// Parses a full-text query string.
pub fn parse(input: &str) -> Result<QueryNode> {
    let lexemes = lex(input)?;
    if lexemes.is_empty() {
        return Err(SearchError::invalid_query("query has no searchable terms"));
    }

    let mut parser = Parser {
        lexemes: lexemes.into_iter().peekable(),
    };
    let node = parser.or()?;
    match parser.lexemes.next() {
        None => Ok(node),
        Some(Lexeme::Close) => Err(SearchError::invalid_query("unbalanced ')'")),
        Some(other) => Err(SearchError::invalid_query(format!(
            "unexpected {} in query",
            describe(&other)
        ))),
    }
}

fn lex(input: &str) -> Result<Vec<Lexeme>> {
    let mut lexemes = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                lexemes.push(Lexeme::Open);
            }
            ')' => {
                chars.next();
                lexemes.push(Lexeme::Close);
            }
            '"' => {
                chars.next();
                let body_start = start + 1;
                let mut end = None;
                while let Some((i, c)) = chars.next() {
                    // A quote followed by a letter is gershayim inside the phrase (`ר"ת`).
                    if c == '"' && !chars.peek().is_some_and(|&(_, next)| next.is_alphanumeric()) {
                        end = Some(i);
                        break;
                    }
                }
                let Some(end) = end else {
                    return Err(SearchError::invalid_query("unterminated quoted phrase"));
                };
                if let Some(node) = phrase_node(tokenize(&input[body_start..end])) {
                    lexemes.push(Lexeme::Leaf(node));
                }
            }
            _ => {
                // Quotes inside a word belong to it, as in `ז"ל`.
                let mut end = input.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')') {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                let word = &input[start..end];
                match word {
                    "AND" => lexemes.push(Lexeme::And),
                    "OR" => lexemes.push(Lexeme::Or),
                    "NOT" => lexemes.push(Lexeme::Not),
                    _ => {
                        if let Some(node) = word_node(word) {
                            lexemes.push(Lexeme::Leaf(node));
                        } else {
                            tracing::debug!("Ignoring query word without tokens: {:?}", word);
                        }
                    }
                }
            }
        }
    }

    Ok(lexemes)
}

fn word_node(word: &str) -> Option<QueryNode> {
    let stem = word.trim_end_matches('*');
    if stem.len() == word.len() {
        return phrase_node(tokenize(word));
    }

    let mut tokens = tokenize(stem);
    let last = tokens.pop()?;
    if tokens.is_empty() {
        return Some(QueryNode::Prefix(last));
    }
    let mut parts: Vec<QueryNode> = tokens.into_iter().map(QueryNode::Term).collect();
    parts.push(QueryNode::Prefix(last));
    Some(QueryNode::And(parts))
}

fn phrase_node(mut tokens: Vec<String>) -> Option<QueryNode> {
    match tokens.len() {
        0 => None,
        1 => tokens.pop().map(QueryNode::Term),
        _ => Some(QueryNode::Phrase(tokens)),
    }
}

fn describe(lexeme: &Lexeme) -> &'static str {
    match lexeme {
        Lexeme::Leaf(_) => "term",
        Lexeme::And => "'AND'",
        Lexeme::Or => "'OR'",
        Lexeme::Not => "'NOT'",
        Lexeme::Open => "'('",
        Lexeme::Close => "')'",
    }
}

struct Parser {
    lexemes: Peekable<IntoIter<Lexeme>>,
}

impl Parser {
    fn or(&mut self) -> Result<QueryNode> {
        let mut parts = vec![self.and()?];
        while self.lexemes.next_if_eq(&Lexeme::Or).is_some() {
            parts.push(self.and()?);
        }
        Ok(flatten(parts, QueryNode::Or))
    }

    fn and(&mut self) -> Result<QueryNode> {
        let mut parts = vec![self.not()?];
        loop {
            if self.lexemes.next_if_eq(&Lexeme::And).is_some() {
                parts.push(self.not()?);
                continue;
            }
            match self.lexemes.peek() {
                Some(Lexeme::Leaf(_) | Lexeme::Open) => parts.push(self.not()?),
                _ => break,
            }
        }
        Ok(flatten(parts, QueryNode::And))
    }

    fn not(&mut self) -> Result<QueryNode> {
        let mut node = self.primary()?;
        while self.lexemes.next_if_eq(&Lexeme::Not).is_some() {
            node = QueryNode::Not {
                include: Box::new(node),
                exclude: Box::new(self.primary()?),
            };
        }
        Ok(node)
    }

    fn primary(&mut self) -> Result<QueryNode> {
        match self.lexemes.next() {
            Some(Lexeme::Leaf(node)) => Ok(node),
            Some(Lexeme::Open) => {
                let node = self.or()?;
                if self.lexemes.next_if_eq(&Lexeme::Close).is_none() {
                    return Err(SearchError::invalid_query("missing ')'"));
                }
                Ok(node)
            }
            Some(other) => Err(SearchError::invalid_query(format!(
                "expected a term but found {}",
                describe(&other)
            ))),
            None => Err(SearchError::invalid_query("query ends with an operator")),
        }
    }
}

fn flatten(mut parts: Vec<QueryNode>, combine: fn(Vec<QueryNode>) -> QueryNode) -> QueryNode {
    if parts.len() == 1 {
        parts.swap_remove(0)
    } else {
        combine(parts)
    }
}

impl QueryNode {
    /// Documents matching the whole query.
    pub fn matches<R: IndexReader>(&self, reader: &R) -> BTreeSet<DocOrd> {
        match self {
            Self::Term(_) | Self::Prefix(_) | Self::Phrase(_) => {
                self.frequencies(reader).into_iter().map(|(doc, _)| doc).collect()
            }
            Self::And(parts) => {
                let mut sets: Vec<BTreeSet<DocOrd>> =
                    parts.iter().map(|part| part.matches(reader)).collect();
                sets.sort_by_key(BTreeSet::len);
                let mut sets = sets.into_iter();
                let Some(mut acc) = sets.next() else {
                    return BTreeSet::new();
                };
                for set in sets {
                    acc.retain(|doc| set.contains(doc));
                    if acc.is_empty() {
                        break;
                    }
                }
                acc
            }
            Self::Or(parts) => parts.iter().flat_map(|part| part.matches(reader)).collect(),
            Self::Not { include, exclude } => {
                let exclude = exclude.matches(reader);
                let mut docs = include.matches(reader);
                docs.retain(|doc| !exclude.contains(doc));
                docs
            }
        }
    }

    /// Term, prefix and phrase leaves outside any `NOT` exclusion.
    pub fn positive_leaves(&self) -> Vec<&Self> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        match self {
            Self::Term(_) | Self::Prefix(_) | Self::Phrase(_) => out.push(self),
            Self::And(parts) | Self::Or(parts) => {
                for part in parts {
                    part.collect_leaves(out);
                }
            }
            Self::Not { include, .. } => include.collect_leaves(out),
        }
    }

    /// Matchers for the spans the highlighter should mark.
    pub fn highlight_matchers(&self) -> Vec<TermMatcher> {
        let mut matchers = Vec::new();
        for leaf in self.positive_leaves() {
            match leaf {
                Self::Term(term) => matchers.push(TermMatcher::Exact(term.clone())),
                Self::Prefix(prefix) => matchers.push(TermMatcher::Prefix(prefix.clone())),
                Self::Phrase(terms) => matchers.push(TermMatcher::Phrase(terms.clone())),
                _ => {}
            }
        }
        matchers.sort();
        matchers.dedup();
        matchers
    }

    /// Per-document occurrence counts of a leaf, ascending by ordinal.
    ///
    /// Composite nodes have no frequencies of their own and yield nothing.
    pub fn frequencies<R: IndexReader>(&self, reader: &R) -> Vec<(DocOrd, u32)> {
        match self {
            Self::Term(term) => reader
                .postings(term)
                .iter()
                .map(|p| (p.doc, p.term_frequency()))
                .collect(),
            Self::Prefix(prefix) => {
                let mut merged: BTreeMap<DocOrd, u32> = BTreeMap::new();
                for (_, postings) in reader.prefix_postings(prefix) {
                    for posting in postings {
                        *merged.entry(posting.doc).or_default() += posting.term_frequency();
                    }
                }
                merged.into_iter().collect()
            }
            Self::Phrase(terms) => phrase_frequencies(reader, terms),
            _ => Vec::new(),
        }
    }
}

fn phrase_frequencies<R: IndexReader>(reader: &R, terms: &[String]) -> Vec<(DocOrd, u32)> {
    let lists: Vec<&[Posting]> = terms.iter().map(|term| reader.postings(term)).collect();
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    'docs: for head in *first {
        let mut followers = Vec::with_capacity(rest.len());
        for list in rest {
            match list.binary_search_by_key(&head.doc, |p| p.doc) {
                Ok(i) => followers.push(&list[i].positions),
                Err(_) => continue 'docs,
            }
        }

        let count = head
            .positions
            .iter()
            .filter(|&&start| {
                followers
                    .iter()
                    .zip(1u32..)
                    .all(|(positions, offset)| positions.binary_search(&(start + offset)).is_ok())
            })
            .count() as u32;
        if count > 0 {
            out.push((head.doc, count));
        }
    }
    out
}
