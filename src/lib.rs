// Library exports for tahkik

pub mod apparatus;
pub mod config;
pub mod error;
pub mod model;
pub mod page_index;
pub mod pagination;
pub mod playback;
pub mod records;
pub mod store;
pub mod tokenizer;

pub use error::{Result, TahkikError};
pub use model::{ErrorSpan, Footnote, FootnoteKind, Line, LineNo, Witness};
pub use store::{Change, DocumentStore, FootnoteDraft, RenderedPage, SelectionOutcome, TokenLocation};
