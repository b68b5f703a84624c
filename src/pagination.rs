// Virtual pagination
// Estimates wrapped height per line without a typesetting engine and fills fixed-height
// pages greedily. A pure function of (lines, footnotes, font size, layout).

use std::collections::HashMap;

use unicode_segmentation::UnicodeSegmentation;

use crate::config::LayoutConfig;
use crate::model::{Footnote, Line, LineNo};

/// A derived page bucket; never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub key: String,
    pub lines: Vec<Line>,
    /// Footnotes of the page's lines in (line order, char_offset) order
    pub footnotes: Vec<Footnote>,
    pub estimated_height: f32,
}

impl Page {
    pub fn contains_line(&self, line_no: LineNo) -> bool {
        self.lines.iter().any(|l| l.line_no == line_no)
    }
}

/// Rows a line occupies once wrapped: ceil((chars + 1) / chars_per_row).
/// Deliberately counts grapheme clusters rather than chars, so combining marks add no width.
pub fn estimated_wrapped_lines(text: &str, chars_per_row: usize) -> usize {
    let chars = text.graphemes(true).count();
    (chars + 1).div_ceil(chars_per_row.max(1))
}

/// Footnotes grouped per line, each group sorted by char_offset
pub fn footnotes_by_line(footnotes: &[Footnote]) -> HashMap<LineNo, Vec<&Footnote>> {
    let mut map: HashMap<LineNo, Vec<&Footnote>> = HashMap::new();
    for f in footnotes {
        map.entry(f.line_no).or_default().push(f);
    }
    for group in map.values_mut() {
        group.sort_by_key(|f| f.char_offset);
    }
    map
}

pub fn paginate(
    lines: &[Line],
    footnotes: &[Footnote],
    font_size: f32,
    layout: &LayoutConfig,
) -> Vec<Page> {
    let chars_per_row = layout.chars_per_page_line(font_size);
    let line_height = layout.line_height(font_size);
    let by_line = footnotes_by_line(footnotes);

    let mut pages = Vec::new();
    let mut current = new_page(1);

    for line in lines {
        let notes = by_line.get(&line.line_no).map(Vec::as_slice).unwrap_or(&[]);
        let height = estimated_wrapped_lines(&line.raw_text, chars_per_row) as f32 * line_height
            + notes.len() as f32 * layout.footnote_row_height;

        // A line that alone exceeds the page still gets a page of its own
        if !current.lines.is_empty() && current.estimated_height + height > layout.page_content_height {
            let next = new_page(pages.len() + 2);
            pages.push(std::mem::replace(&mut current, next));
        }

        current.lines.push(line.clone());
        current.footnotes.extend(notes.iter().map(|&f| f.clone()));
        current.estimated_height += height;
    }

    if !current.lines.is_empty() {
        pages.push(current);
    }

    tracing::debug!(
        lines = lines.len(),
        pages = pages.len(),
        chars_per_row,
        "paginated"
    );
    pages
}

fn new_page(number: usize) -> Page {
    Page {
        key: format!("page-{number}"),
        lines: Vec::new(),
        footnotes: Vec::new(),
        estimated_height: 0.0,
    }
}
