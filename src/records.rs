// Wire shapes of the records exchanged with external collaborators
// (alignment output, page index, footnote persistence, speech synthesis).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{BBox, ErrorSpan, Footnote, FootnoteKind, Line, LineNo, Witness};

/// Best-matching transcription for a line, produced by the alignment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMatch {
    pub raw: String,
    /// Start word reported by the aligner; only used to detect index drift
    #[serde(default)]
    pub start_word: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub line_no: LineNo,
    pub best: BestMatch,
    #[serde(default)]
    pub line_marks: Vec<ErrorSpan>,
    #[serde(default)]
    pub page_image: String,
    #[serde(default)]
    pub bbox: Option<BBox>,
}

impl LineRecord {
    pub fn into_line(self) -> Line {
        Line {
            line_no: self.line_no,
            raw_text: self.best.raw,
            start_token: 0,
            page_ref: self.page_image,
            bbox: self.bbox,
            error_spans: self.line_marks.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub key: String,
    pub index: usize,
    pub image_filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootnoteRecord {
    pub id: Uuid,
    pub line_no: LineNo,
    /// Plain-text character offset into the line
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: FootnoteKind,
    pub nusha_index: u8,
    #[serde(default)]
    pub content: String,
}

impl FootnoteRecord {
    pub fn into_footnote(self) -> Result<Footnote> {
        Ok(Footnote {
            id: self.id,
            line_no: self.line_no,
            char_offset: self.index,
            kind: self.kind,
            witness: Witness::new(self.nusha_index)?,
            content: self.content,
        })
    }
}

impl From<&Footnote> for FootnoteRecord {
    fn from(f: &Footnote) -> Self {
        FootnoteRecord {
            id: f.id,
            line_no: f.line_no,
            index: f.char_offset,
            kind: f.kind,
            nusha_index: f.witness.index(),
            content: f.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimepointRecord {
    pub mark: String,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunkRecord {
    #[serde(default)]
    pub audio_bytes: Vec<u8>,
    #[serde(default)]
    pub timepoints: Vec<TimepointRecord>,
}

/// Everything needed to open a project: lines per witness, page images, footnotes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectBundle {
    #[serde(default)]
    pub witnesses: BTreeMap<u8, Vec<LineRecord>>,
    #[serde(default)]
    pub pages: Vec<PageRecord>,
    #[serde(default)]
    pub footnotes: Vec<FootnoteRecord>,
}

impl ProjectBundle {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
