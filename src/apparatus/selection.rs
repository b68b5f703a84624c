// Selection offset resolution
// Maps a selection inside rendered line markup back to plain-text character offsets
// so new footnotes can be anchored on the canonical text.

use std::cmp::Ordering;

use super::markup::LineMarkup;
use crate::model::LineNo;

/// One end of a selection: a leaf of a rendered line and a character offset inside it.
/// `line_no` is None when the point is outside any line container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPoint {
    pub line_no: Option<LineNo>,
    pub leaf: usize,
    pub offset: usize,
}

impl SelectionPoint {
    pub fn new(line_no: LineNo, leaf: usize, offset: usize) -> Self {
        SelectionPoint {
            line_no: Some(line_no),
            leaf,
            offset,
        }
    }

    pub fn outside() -> Self {
        SelectionPoint {
            line_no: None,
            leaf: 0,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: SelectionPoint,
    pub focus: SelectionPoint,
}

impl Selection {
    pub fn new(anchor: SelectionPoint, focus: SelectionPoint) -> Self {
        Selection { anchor, focus }
    }

    pub fn caret(point: SelectionPoint) -> Self {
        Selection {
            anchor: point,
            focus: point,
        }
    }
}

/// What a resolved selection asks the document to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionAction {
    /// Annotate a single line between two plain-text offsets
    Annotate {
        line_no: LineNo,
        start: usize,
        end: usize,
        text: String,
    },
    /// Selection spans several lines: merge them (first..=last in display order)
    MergeLines { first: LineNo, last: LineNo },
}

/// Plain-text offset of a point inside a line. Marker leaves contribute nothing;
/// a point inside a marker resolves to the offset where the marker sits.
pub fn plain_offset(markup: &LineMarkup, leaf: usize, offset: usize) -> usize {
    let leaves = markup.leaves();
    let before: usize = leaves.iter().take(leaf).map(|l| l.char_len()).sum();
    match leaves.get(leaf) {
        Some(l) if l.is_marker() => before,
        Some(l) => before + offset.min(l.char_len()),
        None => before,
    }
}

/// Resolve a selection against the rendered lines (in display order).
/// Returns None when either end is outside an editable line.
pub fn resolve_selection(lines: &[LineMarkup], selection: &Selection) -> Option<SelectionAction> {
    let (Some(anchor_line), Some(focus_line)) = (selection.anchor.line_no, selection.focus.line_no)
    else {
        tracing::debug!("selection outside editable text discarded");
        return None;
    };

    let position = |line_no: LineNo| lines.iter().position(|m| m.line_no == line_no);
    let anchor_idx = position(anchor_line)?;
    let focus_idx = position(focus_line)?;

    if anchor_idx != focus_idx {
        let (first, last) = if anchor_idx < focus_idx {
            (anchor_line, focus_line)
        } else {
            (focus_line, anchor_line)
        };
        return Some(SelectionAction::MergeLines { first, last });
    }

    let markup = &lines[anchor_idx];
    let a = plain_offset(markup, selection.anchor.leaf, selection.anchor.offset);
    let b = plain_offset(markup, selection.focus.leaf, selection.focus.offset);
    let (start, end) = match a.cmp(&b) {
        Ordering::Greater => (b, a),
        _ => (a, b),
    };

    let selected: String = markup
        .plain_text()
        .chars()
        .skip(start)
        .take(end - start)
        .collect();
    let trimmed = selected.trim_end();
    let end = start + trimmed.chars().count();

    Some(SelectionAction::Annotate {
        line_no: anchor_line,
        start,
        end,
        text: trimmed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apparatus::footnote_merge::merge_footnotes;
    use crate::apparatus::span_resolver::resolve_text;
    use crate::model::{ErrorSpanSet, Footnote, FootnoteKind, Witness};
    use crate::playback::PlaybackPosition;

    fn markup(line_no: LineNo, text: &str) -> LineMarkup {
        resolve_text(line_no, text, 0, &ErrorSpanSet::new(), PlaybackPosition::none())
    }

    fn note(offset: usize) -> Footnote {
        Footnote::new(1, offset, FootnoteKind::Addition, Witness::default(), "")
    }

    #[test]
    fn test_offset_skips_markers() {
        // leaves: "ab", M, " ", "cd"
        let merged = merge_footnotes(markup(1, "ab cd"), &[note(2)], 1);
        assert_eq!(plain_offset(&merged, 3, 1), 4);
        assert_eq!(plain_offset(&merged, 1, 5), 2);
        assert_eq!(plain_offset(&merged, 99, 0), 5);
    }

    #[test]
    fn test_trailing_whitespace_trimmed() {
        // "hello", " ", "world"; select "hello " (leaf 0..leaf 1 end)
        let lines = vec![markup(7, "hello world")];
        let sel = Selection::new(SelectionPoint::new(7, 0, 0), SelectionPoint::new(7, 1, 1));
        let action = resolve_selection(&lines, &sel).unwrap();
        assert_eq!(
            action,
            SelectionAction::Annotate {
                line_no: 7,
                start: 0,
                end: 5,
                text: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_backwards_selection_normalized() {
        let lines = vec![markup(7, "hello world")];
        let sel = Selection::new(SelectionPoint::new(7, 2, 5), SelectionPoint::new(7, 2, 0));
        match resolve_selection(&lines, &sel).unwrap() {
            SelectionAction::Annotate { start, end, text, .. } => {
                assert_eq!((start, end), (6, 11));
                assert_eq!(text, "world");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_caret() {
        let lines = vec![markup(7, "hello world")];
        let sel = Selection::caret(SelectionPoint::new(7, 0, 3));
        match resolve_selection(&lines, &sel).unwrap() {
            SelectionAction::Annotate { start, end, .. } => assert_eq!((start, end), (3, 3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_multi_line_becomes_merge() {
        let lines = vec![markup(3, "a"), markup(4, "b"), markup(9, "c")];
        let sel = Selection::new(SelectionPoint::new(9, 0, 0), SelectionPoint::new(3, 0, 1));
        assert_eq!(
            resolve_selection(&lines, &sel),
            Some(SelectionAction::MergeLines { first: 3, last: 9 })
        );
    }

    #[test]
    fn test_outside_discarded() {
        let lines = vec![markup(3, "a")];
        let sel = Selection::new(SelectionPoint::outside(), SelectionPoint::new(3, 0, 1));
        assert_eq!(resolve_selection(&lines, &sel), None);
    }
}
