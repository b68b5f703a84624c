use thiserror::Error;
use uuid::Uuid;

use crate::model::LineNo;

/// Errors produced by the apparatus engine and its document store
#[derive(Debug, Error)]
pub enum TahkikError {
    #[error("line {0} does not exist")]
    UnknownLine(LineNo),
    #[error("footnote {0} does not exist")]
    UnknownFootnote(Uuid),
    #[error("anchor offset {offset} is outside the line (length {len})")]
    AnchorOutOfRange { offset: usize, len: usize },
    #[error("witness index {0} is outside 1..=4")]
    InvalidWitness(u8),
    #[error("playback rate {0} must be a positive finite number")]
    InvalidPlaybackRate(f32),
    #[error("font size {0} must be a positive finite number")]
    InvalidFontSize(f32),
    #[error("lines {0} and {1} cannot be merged")]
    InvalidMerge(LineNo, LineNo),
    #[error("nothing in the trash for {0}")]
    NotInTrash(String),
    #[error("failed to decode record: {0}")]
    Record(#[from] serde_json::Error),
    #[error("failed to decode settings: {0}")]
    Settings(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TahkikError>;
