// Apparatus block: the numbered footnote list printed under a page

use std::fmt;

use uuid::Uuid;

use crate::model::{Footnote, FootnoteKind, LineNo, Witness};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApparatusEntry {
    pub number: usize,
    pub footnote_id: Uuid,
    pub line_no: LineNo,
    pub witness: Witness,
    pub kind: FootnoteKind,
    pub content: String,
}

impl ApparatusEntry {
    pub fn new(number: usize, footnote: &Footnote) -> Self {
        ApparatusEntry {
            number,
            footnote_id: footnote.id,
            line_no: footnote.line_no,
            witness: footnote.witness,
            kind: footnote.kind,
            content: footnote.content.clone(),
        }
    }
}

impl fmt::Display for ApparatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.kind {
            FootnoteKind::Variation => "",
            FootnoteKind::Omission => "- ",
            FootnoteKind::Addition => "+ ",
        };
        write!(f, "{}. {}: {}{}", self.number, self.witness, sign, self.content)
    }
}

/// Number footnotes in (line order, char_offset) order starting from `first_number`.
/// `footnotes` must already be grouped by line in display order.
pub fn number_entries<'a>(
    footnotes: impl IntoIterator<Item = &'a Footnote>,
    first_number: usize,
) -> Vec<ApparatusEntry> {
    footnotes
        .into_iter()
        .enumerate()
        .map(|(i, f)| ApparatusEntry::new(first_number + i, f))
        .collect()
}
