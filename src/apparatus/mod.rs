// Apparatus rendering: token styling, footnote anchoring, selection mapping

pub mod block;
pub mod footnote_merge;
pub mod markup;
pub mod selection;
pub mod span_resolver;

pub use block::ApparatusEntry;
pub use footnote_merge::merge_footnotes;
pub use markup::{FootnoteMarker, Leaf, LineMarkup, TokenStyle};
pub use selection::{resolve_selection, Selection, SelectionAction, SelectionPoint};
pub use span_resolver::{resolve_line, resolve_text, ErrorClass};
