// Core document entities shared by every view
// Lines are identified by their stable `line_no`; `start_token` is always derived.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TahkikError};

/// Stable identity of a line across edits
pub type LineNo = u32;

/// A manuscript witness (nüsha), numbered 1..=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Witness(u8);

impl Witness {
    pub const MAX: u8 = 4;

    pub fn new(index: u8) -> Result<Self> {
        if (1..=Self::MAX).contains(&index) {
            Ok(Witness(index))
        } else {
            Err(TahkikError::InvalidWitness(index))
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Single-letter label used in apparatus citations (A..D)
    pub fn sigla(self) -> char {
        (b'A' + self.0 - 1) as char
    }

    pub fn all() -> impl Iterator<Item = Witness> {
        (1..=Self::MAX).map(Witness)
    }
}

impl Default for Witness {
    fn default() -> Self {
        Witness(1)
    }
}

impl TryFrom<u8> for Witness {
    type Error = TahkikError;

    fn try_from(value: u8) -> Result<Self> {
        Witness::new(value)
    }
}

impl From<Witness> for u8 {
    fn from(w: Witness) -> u8 {
        w.0
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sigla())
    }
}

/// Bounding box of a line on its page image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl From<[f32; 4]> for BBox {
    fn from([x0, y0, x1, y1]: [f32; 4]) -> Self {
        BBox { x0, y0, x1, y1 }
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// A spellcheck / alignment mark on a single word, produced externally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSpan {
    pub global_token_index: usize,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub wrong: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub reason: String,
}

/// Error spans of one line, unique per global token index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSpanSet {
    spans: BTreeMap<usize, ErrorSpan>,
}

impl ErrorSpanSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a span; a span already present for the same token is replaced (last wins)
    pub fn insert(&mut self, span: ErrorSpan) -> Option<ErrorSpan> {
        self.spans.insert(span.global_token_index, span)
    }

    pub fn get(&self, token: usize) -> Option<&ErrorSpan> {
        self.spans.get(&token)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorSpan> {
        self.spans.values()
    }

    /// Re-key every span by `delta` tokens after the word count before its line changed.
    /// Spans that would fall below token 0 are dropped.
    pub fn shift(&mut self, delta: isize) {
        if delta == 0 {
            return;
        }
        self.spans = std::mem::take(&mut self.spans)
            .into_values()
            .filter_map(|mut span| {
                span.global_token_index = span.global_token_index.checked_add_signed(delta)?;
                Some((span.global_token_index, span))
            })
            .collect();
    }
}

impl Extend<ErrorSpan> for ErrorSpanSet {
    fn extend<I: IntoIterator<Item = ErrorSpan>>(&mut self, iter: I) {
        for span in iter {
            self.insert(span);
        }
    }
}

impl IntoIterator for ErrorSpanSet {
    type Item = ErrorSpan;
    type IntoIter = std::collections::btree_map::IntoValues<usize, ErrorSpan>;

    fn into_iter(self) -> Self::IntoIter {
        self.spans.into_values()
    }
}

impl FromIterator<ErrorSpan> for ErrorSpanSet {
    fn from_iter<I: IntoIterator<Item = ErrorSpan>>(iter: I) -> Self {
        let mut set = ErrorSpanSet::new();
        for span in iter {
            let token = span.global_token_index;
            if set.insert(span).is_some() {
                tracing::warn!(token, "duplicate error span replaced");
            }
        }
        set
    }
}

/// A line of one witness's transcription
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub line_no: LineNo,
    pub raw_text: String,
    /// Derived by the token indexer; never authoritative
    pub start_token: usize,
    pub page_ref: String,
    pub bbox: Option<BBox>,
    pub error_spans: ErrorSpanSet,
}

impl Line {
    pub fn new(line_no: LineNo, raw_text: impl Into<String>) -> Self {
        Line {
            line_no,
            raw_text: raw_text.into(),
            start_token: 0,
            page_ref: String::new(),
            bbox: None,
            error_spans: ErrorSpanSet::new(),
        }
    }

    pub fn with_page_ref(mut self, page_ref: impl Into<String>) -> Self {
        self.page_ref = page_ref.into();
        self
    }

    pub fn with_error_spans(mut self, spans: impl IntoIterator<Item = ErrorSpan>) -> Self {
        self.error_spans = spans.into_iter().collect();
        self
    }

    /// Length of the raw text in characters
    pub fn char_len(&self) -> usize {
        self.raw_text.chars().count()
    }
}

/// Kind of variant reading a footnote records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FootnoteKind {
    Variation,
    Omission,
    Addition,
}

/// An apparatus footnote anchored at a plain-text character offset of a line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footnote {
    pub id: Uuid,
    pub line_no: LineNo,
    pub char_offset: usize,
    #[serde(rename = "type")]
    pub kind: FootnoteKind,
    pub witness: Witness,
    pub content: String,
}

impl Footnote {
    pub fn new(
        line_no: LineNo,
        char_offset: usize,
        kind: FootnoteKind,
        witness: Witness,
        content: impl Into<String>,
    ) -> Self {
        Footnote {
            id: Uuid::new_v4(),
            line_no,
            char_offset,
            kind,
            witness,
            content: content.into(),
        }
    }
}
