// Footnote anchoring
// Footnotes are positioned by plain-text character offset, a coordinate system
// independent of the token leaves produced by the span resolver. This pass walks the
// text-bearing leaves, splitting them where footnotes land and inserting marker leaves.

use super::markup::{FootnoteMarker, Leaf, LineMarkup};
use crate::model::Footnote;

/// Insert one marker per footnote into already-resolved markup.
///
/// Footnotes are numbered from `first_number` in ascending `char_offset` order (ties keep
/// the input order). An offset equal to the end of a leaf binds to the end of that leaf,
/// never to the start of the following one. Offsets past the end of the text are clamped
/// to the end. Marker leaves already present are passed through and do not advance the
/// running offset.
pub fn merge_footnotes(markup: LineMarkup, footnotes: &[Footnote], first_number: usize) -> LineMarkup {
    let mut sorted: Vec<&Footnote> = footnotes.iter().collect();
    sorted.sort_by_key(|f| f.char_offset);

    let total = markup.text_len();
    let line_no = markup.line_no;
    let mut pending = sorted.into_iter().enumerate().peekable();
    let marker = |n: usize, note: &Footnote| {
        Leaf::Marker(FootnoteMarker {
            footnote_id: note.id,
            number: first_number + n,
            kind: note.kind,
        })
    };

    let mut out = LineMarkup::new(line_no);
    let mut pos = 0usize;

    for leaf in markup.into_leaves() {
        if leaf.is_marker() {
            out.push(leaf);
            continue;
        }

        let end = pos + leaf.char_len();
        let mut start = pos;
        let mut rest = leaf;

        // Keep scanning the remainder of a split leaf so several footnotes can land in it
        while let Some(&(n, note)) = pending.peek() {
            let offset = note.char_offset.min(total).max(start);
            if offset > end {
                break;
            }
            let (left, right) = rest.split_at_char(offset - start);
            out.push(left);
            out.push(marker(n, note));
            rest = right;
            start = offset;
            pending.next();
        }

        out.push(rest);
        pos = end;
    }

    // Lines without text (or anchors at the very end after trailing markers)
    for (n, note) in pending {
        out.push(marker(n, note));
    }

    out
}
