//! Match snippets for full-text hits.

use super::tokenize::{Token, tokenize_with_offsets};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Which normalized tokens count as a match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TermMatcher {
    Exact(String),
    Prefix(String),
    /// Consecutive tokens, marked as one span.
    Phrase(Vec<String>),
}

impl TermMatcher {
    /// Number of leading `tokens` this matcher covers, if it matches there.
    fn match_len(&self, tokens: &[Token]) -> Option<usize> {
        match self {
            Self::Exact(expected) => (tokens.first()?.term == *expected).then_some(1),
            Self::Prefix(prefix) => tokens.first()?.term.starts_with(prefix.as_str()).then_some(1),
            Self::Phrase(terms) if terms.is_empty() => None,
            Self::Phrase(terms) => {
                let run = tokens.get(..terms.len())?;
                run.iter()
                    .zip(terms)
                    .all(|(token, term)| token.term == *term)
                    .then_some(terms.len())
            }
        }
    }
}

/// Shape of generated snippets. Lengths are counted in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightOptions {
    pub max_fragments: usize,
    pub fragment_chars: usize,
    /// Characters kept before the first match of a fragment.
    pub context_chars: usize,
    pub open: String,
    pub close: String,
    pub ellipsis: String,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            max_fragments: 3,
            fragment_chars: 200,
            context_chars: 50,
            open: "<b>".to_string(),
            close: "</b>".to_string(),
            ellipsis: "...".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    matcher: usize,
}

#[derive(Debug)]
struct Fragment {
    start: usize,
    end: usize,
    spans: Vec<Span>,
    distinct: usize,
}

/// Builds a snippet of `content` around tokens accepted by `matchers`.
///
/// Returns `None` when no token matches.
pub fn highlight(content: &str, matchers: &[TermMatcher], options: &HighlightOptions) -> Option<String> {
    if matchers.is_empty() || options.max_fragments == 0 {
        return None;
    }

    // Byte offset of every char, plus the end of the text.
    let offsets: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();
    let to_char = |byte: usize| offsets.binary_search(&byte).unwrap_or_else(|i| i);
    let total = offsets.len() - 1;

    // Longest match wins at each token; covered tokens are not matched again.
    let tokens = tokenize_with_offsets(content);
    let mut spans = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let best = matchers
            .iter()
            .enumerate()
            .filter_map(|(idx, m)| m.match_len(&tokens[i..]).map(|len| (len, idx)))
            .max_by_key(|&(len, idx)| (len, Reverse(idx)));
        match best {
            Some((len, matcher)) => {
                spans.push(Span {
                    start: to_char(tokens[i].start),
                    end: to_char(tokens[i + len - 1].end),
                    matcher,
                });
                i += len;
            }
            None => i += 1,
        }
    }
    if spans.is_empty() {
        return None;
    }

    let chars: Vec<char> = content.chars().collect();
    let mut fragments = build_fragments(&spans, &chars, options);

    fragments.sort_by(|a, b| {
        b.distinct
            .cmp(&a.distinct)
            .then(b.spans.len().cmp(&a.spans.len()))
            .then(a.start.cmp(&b.start))
    });
    fragments.truncate(options.max_fragments);
    fragments.sort_by_key(|fragment| fragment.start);

    let mut out = String::new();
    let mut last_end = None;
    for fragment in &fragments {
        if fragment.start > 0 && last_end != Some(fragment.start) {
            out.push_str(&options.ellipsis);
        }
        render(&mut out, &chars, fragment, options);
        last_end = Some(fragment.end);
    }
    if last_end.is_some_and(|end| end < total) {
        out.push_str(&options.ellipsis);
    }
    Some(out)
}

fn build_fragments(spans: &[Span], chars: &[char], options: &HighlightOptions) -> Vec<Fragment> {
    let total = chars.len();
    let mut fragments = Vec::new();
    let mut i = 0;

    while i < spans.len() {
        let first = spans[i];
        // Fragments never overlap; the previous one ends before this match.
        let floor = fragments.last().map_or(0, |f: &Fragment| f.end);
        let mut start = first.start.saturating_sub(options.context_chars).max(floor);
        let mut end = (start + options.fragment_chars).max(first.end).min(total);

        let mut j = i + 1;
        while j < spans.len() && spans[j].end <= end {
            j += 1;
        }
        if let Some(next) = spans.get(j) {
            end = end.min(next.start);
        }
        let last = spans[j - 1];

        // Snap both edges to whitespace so words are not cut in half.
        if start > floor
            && let Some(ws) = chars[start..first.start].iter().position(|c| c.is_whitespace())
        {
            start += ws + 1;
        }
        if end < total
            && let Some(ws) = chars[last.end..end].iter().rposition(|c| c.is_whitespace())
        {
            end = last.end + ws;
        }

        let mut matchers: Vec<usize> = spans[i..j].iter().map(|span| span.matcher).collect();
        matchers.sort_unstable();
        matchers.dedup();
        fragments.push(Fragment {
            start,
            end,
            spans: spans[i..j].to_vec(),
            distinct: matchers.len(),
        });
        i = j;
    }

    fragments
}

fn render(out: &mut String, chars: &[char], fragment: &Fragment, options: &HighlightOptions) {
    let mut pos = fragment.start;
    for span in &fragment.spans {
        out.extend(&chars[pos..span.start]);
        out.push_str(&options.open);
        out.extend(&chars[span.start..span.end]);
        out.push_str(&options.close);
        pos = span.end;
    }
    out.extend(&chars[pos..fragment.end]);
}
