// Word splitting and global token indexing
// Every consumer of token indices (span resolver, playback, locator) goes
// through `split_parts` so the indexer and the renderer can never disagree.

use std::collections::HashMap;

use crate::model::{Line, LineNo};

/// A maximal run of either whitespace or non-whitespace characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPart<'a> {
    pub text: &'a str,
    /// Character (not byte) offset of the part within the line
    pub char_start: usize,
    pub char_len: usize,
    pub is_word: bool,
}

impl TextPart<'_> {
    pub fn char_end(&self) -> usize {
        self.char_start + self.char_len
    }
}

/// Split text into alternating whitespace / word parts, preserving whitespace verbatim.
/// Concatenating the parts yields the input. Empty input yields no parts.
pub fn split_parts(text: &str) -> Vec<TextPart<'_>> {
    let mut parts = Vec::new();
    let mut start_byte = 0;
    let mut start_char = 0;
    let mut char_count = 0;
    let mut current: Option<bool> = None;

    for (i, ch) in text.char_indices() {
        let is_word = !ch.is_whitespace();
        match current {
            Some(kind) if kind == is_word => {}
            Some(kind) => {
                parts.push(TextPart {
                    text: &text[start_byte..i],
                    char_start: start_char,
                    char_len: char_count - start_char,
                    is_word: kind,
                });
                start_byte = i;
                start_char = char_count;
                current = Some(is_word);
            }
            None => current = Some(is_word),
        }
        char_count += 1;
    }

    if let Some(kind) = current {
        parts.push(TextPart {
            text: &text[start_byte..],
            char_start: start_char,
            char_len: char_count - start_char,
            is_word: kind,
        });
    }

    parts
}

/// Number of words in the text, using the same rule as `split_parts`
pub fn token_count(text: &str) -> usize {
    split_parts(text).iter().filter(|p| p.is_word).count()
}

/// The words of the text, in order
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    split_parts(text)
        .into_iter()
        .filter(|p| p.is_word)
        .map(|p| p.text)
}

/// Start token of every line, in order: a running prefix sum of word counts
pub fn start_tokens<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<usize> {
    let mut next = 0;
    texts
        .into_iter()
        .map(|text| {
            let start = next;
            next += token_count(text);
            start
        })
        .collect()
}

/// Mapping of `line_no -> start_token` for one witness's line array
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenIndex {
    /// (line_no, start_token, token_count) in line order
    entries: Vec<(LineNo, usize, usize)>,
    by_line: HashMap<LineNo, usize>,
    total: usize,
}

impl TokenIndex {
    /// Recompute the index from scratch and write the derived `start_token` back into the lines
    pub fn rebuild(lines: &mut [Line]) -> Self {
        let mut index = TokenIndex::default();
        let mut next = 0;

        for (i, line) in lines.iter_mut().enumerate() {
            let count = token_count(&line.raw_text);
            line.start_token = next;
            index.entries.push((line.line_no, next, count));
            index.by_line.insert(line.line_no, i);
            next += count;
        }

        index.total = next;
        tracing::debug!(lines = lines.len(), tokens = next, "rebuilt token index");
        index
    }

    pub fn start_token(&self, line_no: LineNo) -> Option<usize> {
        self.by_line.get(&line_no).map(|&i| self.entries[i].1)
    }

    pub fn token_count(&self, line_no: LineNo) -> Option<usize> {
        self.by_line.get(&line_no).map(|&i| self.entries[i].2)
    }

    /// Total number of tokens across all lines
    pub fn total(&self) -> usize {
        self.total
    }

    /// Find the line containing a global token, returning (line_no, word index within line)
    pub fn line_for_token(&self, token: usize) -> Option<(LineNo, usize)> {
        if token >= self.total {
            return None;
        }
        // Last entry whose start is <= token; empty lines share a start with their successor
        let idx = self.entries.partition_point(|&(_, start, _)| start <= token);
        self.entries[..idx]
            .iter()
            .rev()
            .find(|&&(_, start, count)| count > 0 && token < start + count)
            .map(|&(line_no, start, _)| (line_no, token - start))
    }
}
