// Annotation span resolver
// Turns a line's raw text into token-level markup, styling each word from its
// error span and the current playback position.

use std::collections::BTreeSet;

use super::markup::{Leaf, LineMarkup, TokenStyle};
use crate::model::{ErrorSpanSet, Line, LineNo};
use crate::playback::PlaybackPosition;
use crate::tokenizer::split_parts;

/// Style class derived from the set of sources that flagged a word.
/// Ordered by priority: agreement of three or more sources beats any pair, which beats a
/// single source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorClass {
    Single(String),
    Pair(String, String),
    Agreement,
}

impl ErrorClass {
    pub fn from_sources(sources: &BTreeSet<String>) -> Option<ErrorClass> {
        let mut names = sources.iter().map(|s| css_ident(s));
        match sources.len() {
            0 => None,
            1 => names.next().map(ErrorClass::Single),
            2 => {
                let a = names.next()?;
                let b = names.next()?;
                Some(ErrorClass::Pair(a, b))
            }
            _ => Some(ErrorClass::Agreement),
        }
    }

    pub fn css_class(&self) -> String {
        match self {
            ErrorClass::Single(a) => format!("mark-single mark-{a}"),
            ErrorClass::Pair(a, b) => format!("mark-pair mark-{a}-{b}"),
            ErrorClass::Agreement => "mark-all".to_string(),
        }
    }
}

fn css_ident(source: &str) -> String {
    source
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Resolve a line into token markup
pub fn resolve_line(line: &Line, playback: PlaybackPosition) -> LineMarkup {
    resolve_text(
        line.line_no,
        &line.raw_text,
        line.start_token,
        &line.error_spans,
        playback,
    )
}

/// Resolve raw text starting at `start_token`. The leaves cover the input exactly once:
/// concatenating their text reproduces `raw_text`.
pub fn resolve_text(
    line_no: LineNo,
    raw_text: &str,
    start_token: usize,
    spans: &ErrorSpanSet,
    playback: PlaybackPosition,
) -> LineMarkup {
    let mut markup = LineMarkup::new(line_no);
    let mut token = start_token;

    for part in split_parts(raw_text) {
        if !part.is_word {
            markup.push(Leaf::Text(part.text.to_string()));
            continue;
        }

        let style = TokenStyle {
            error: spans
                .get(token)
                .and_then(|span| ErrorClass::from_sources(&span.sources)),
            playing: playback.is_at(token),
        };

        if style.is_plain() {
            markup.push(Leaf::Text(part.text.to_string()));
        } else {
            markup.push(Leaf::Token {
                text: part.text.to_string(),
                token_index: token,
                style,
            });
        }
        token += 1;
    }

    markup
}
