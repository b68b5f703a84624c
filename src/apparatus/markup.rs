// Line markup model
// An ordered list of leaves is the single source of truth for both rendering and
// offset math. Marker leaves carry no text and never count toward plain-text offsets.

use std::fmt::Write;

use uuid::Uuid;

use super::span_resolver::ErrorClass;
use crate::model::{FootnoteKind, LineNo};

/// Styling applied to a single token leaf
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenStyle {
    pub error: Option<ErrorClass>,
    pub playing: bool,
}

impl TokenStyle {
    pub fn is_plain(&self) -> bool {
        self.error.is_none() && !self.playing
    }

    pub fn css_classes(&self) -> Vec<String> {
        let mut classes = Vec::new();
        if let Some(error) = &self.error {
            classes.push(error.css_class());
        }
        if self.playing {
            classes.push("now-playing".to_string());
        }
        classes
    }
}

/// Non-text marker inserted where a footnote is anchored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteMarker {
    pub footnote_id: Uuid,
    pub number: usize,
    pub kind: FootnoteKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// Unstyled text (whitespace or plain words)
    Text(String),
    /// A styled word, tagged with its global token index
    Token {
        text: String,
        token_index: usize,
        style: TokenStyle,
    },
    /// Footnote marker; ignored by all offset computations
    Marker(FootnoteMarker),
}

impl Leaf {
    pub fn is_marker(&self) -> bool {
        matches!(self, Leaf::Marker(_))
    }

    /// Text carried by this leaf, or None for markers
    pub fn text(&self) -> Option<&str> {
        match self {
            Leaf::Text(text) | Leaf::Token { text, .. } => Some(text),
            Leaf::Marker(_) => None,
        }
    }

    /// Plain-text length in characters (0 for markers)
    pub fn char_len(&self) -> usize {
        self.text().map(|t| t.chars().count()).unwrap_or(0)
    }

    /// Split a text-bearing leaf at a character offset, keeping its styling on both halves.
    /// Markers are returned unchanged on the left.
    pub fn split_at_char(&self, offset: usize) -> (Leaf, Leaf) {
        let Some(text) = self.text() else {
            return (self.clone(), Leaf::Text(String::new()));
        };
        let byte = text
            .char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let (left, right) = text.split_at(byte);
        (self.with_text(left), self.with_text(right))
    }

    fn with_text(&self, new_text: &str) -> Leaf {
        match self {
            Leaf::Text(_) => Leaf::Text(new_text.to_string()),
            Leaf::Token {
                token_index, style, ..
            } => Leaf::Token {
                text: new_text.to_string(),
                token_index: *token_index,
                style: style.clone(),
            },
            Leaf::Marker(m) => Leaf::Marker(m.clone()),
        }
    }
}

/// Rendered content of one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMarkup {
    pub line_no: LineNo,
    leaves: Vec<Leaf>,
}

impl LineMarkup {
    pub fn new(line_no: LineNo) -> Self {
        LineMarkup {
            line_no,
            leaves: Vec::new(),
        }
    }

    pub fn from_leaves(line_no: LineNo, leaves: Vec<Leaf>) -> Self {
        LineMarkup { line_no, leaves }
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn into_leaves(self) -> Vec<Leaf> {
        self.leaves
    }

    /// Append a leaf; empty text leaves are dropped
    pub fn push(&mut self, leaf: Leaf) {
        if leaf.text().is_some_and(str::is_empty) {
            return;
        }
        self.leaves.push(leaf);
    }

    /// Plain text with markers removed
    pub fn plain_text(&self) -> String {
        self.leaves.iter().filter_map(Leaf::text).collect()
    }

    pub fn text_len(&self) -> usize {
        self.leaves.iter().map(Leaf::char_len).sum()
    }

    pub fn marker_count(&self) -> usize {
        self.leaves.iter().filter(|l| l.is_marker()).count()
    }

    /// Same markup with every marker leaf removed
    pub fn strip_markers(&self) -> LineMarkup {
        LineMarkup {
            line_no: self.line_no,
            leaves: self
                .leaves
                .iter()
                .filter(|l| !l.is_marker())
                .cloned()
                .collect(),
        }
    }

    /// Serialize to HTML. The line container carries the line identity that selection
    /// handling relies on; marker elements are flagged so they are skipped as text.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "<span class=\"line\" data-line-no=\"{}\">", self.line_no);
        for leaf in &self.leaves {
            match leaf {
                Leaf::Text(text) => out.push_str(&escape_html(text)),
                Leaf::Token {
                    text,
                    token_index,
                    style,
                } => {
                    if style.is_plain() {
                        out.push_str(&escape_html(text));
                    } else {
                        let _ = write!(
                            out,
                            "<span class=\"{}\" data-token=\"{}\">{}</span>",
                            style.css_classes().join(" "),
                            token_index,
                            escape_html(text)
                        );
                    }
                }
                Leaf::Marker(marker) => {
                    let _ = write!(
                        out,
                        "<sup class=\"fn-marker fn-{}\" data-ignore=\"true\" data-footnote=\"{}\">{}</sup>",
                        kind_name(marker.kind),
                        marker.footnote_id,
                        marker.number
                    );
                }
            }
        }
        out.push_str("</span>");
        out
    }
}

pub(crate) fn kind_name(kind: FootnoteKind) -> &'static str {
    match kind {
        FootnoteKind::Variation => "variation",
        FootnoteKind::Omission => "omission",
        FootnoteKind::Addition => "addition",
    }
}

/// Escape text for inclusion in HTML element content or attribute values
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(ch),
        }
    }
    result
}

/// Inverse of `escape_html`
pub fn unescape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        result.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let entity = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
        ]
        .into_iter()
        .find(|(name, _)| rest.starts_with(name));
        match entity {
            Some((name, ch)) => {
                result.push(ch);
                rest = &rest[name.len()..];
            }
            None => {
                result.push('&');
                rest = &rest[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_roundtrip() {
        let s = "a < b && \"c\" > 'd' &amp;";
        assert_eq!(unescape_html(&escape_html(s)), s);
        assert_eq!(escape_html("<b>"), "&lt;b&gt;");
    }

    #[test]
    fn test_split_token_keeps_style() {
        let leaf = Leaf::Token {
            text: "الرحمن".to_string(),
            token_index: 2,
            style: TokenStyle {
                error: None,
                playing: true,
            },
        };
        let (left, right) = leaf.split_at_char(2);
        assert_eq!(left.text(), Some("ال"));
        assert_eq!(right.text(), Some("رحمن"));
        assert!(matches!(right, Leaf::Token { token_index: 2, ref style, .. } if style.playing));
    }

    #[test]
    fn test_push_drops_empty_text() {
        let mut markup = LineMarkup::new(1);
        markup.push(Leaf::Text(String::new()));
        markup.push(Leaf::Text("x".to_string()));
        assert_eq!(markup.leaves().len(), 1);
    }

    #[test]
    fn test_markers_do_not_count() {
        let markup = LineMarkup::from_leaves(
            3,
            vec![
                Leaf::Text("ab".to_string()),
                Leaf::Marker(FootnoteMarker {
                    footnote_id: Uuid::nil(),
                    number: 1,
                    kind: FootnoteKind::Addition,
                }),
                Leaf::Text("c".to_string()),
            ],
        );
        assert_eq!(markup.text_len(), 3);
        assert_eq!(markup.plain_text(), "abc");
        assert_eq!(markup.marker_count(), 1);
        assert_eq!(markup.strip_markers().leaves().len(), 2);
    }
}
