// Page-image index
// Source page scans are matched to transcription lines by normalized image filename.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::Line;
use crate::records::PageRecord;

static EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.[A-Za-z0-9]+$").unwrap());

/// Strip any directory and extension, then lowercase: `scans/0001.JPG` -> `0001`
pub fn normalize_image_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    EXTENSION_RE.replace(base, "").to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub key: String,
    pub index: usize,
    pub image_filename: String,
}

#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    pages: Vec<PageImage>,
    by_name: HashMap<String, usize>,
}

impl PageIndex {
    pub fn from_records(records: impl IntoIterator<Item = PageRecord>) -> Self {
        let mut pages: Vec<PageImage> = records
            .into_iter()
            .map(|r| PageImage {
                key: r.key,
                index: r.index,
                image_filename: r.image_filename,
            })
            .collect();
        pages.sort_by_key(|p| p.index);

        let mut by_name = HashMap::new();
        for (i, page) in pages.iter().enumerate() {
            let name = normalize_image_filename(&page.image_filename);
            if by_name.insert(name, i).is_some() {
                tracing::warn!(file = %page.image_filename, "two pages share an image filename");
            }
        }

        PageIndex { pages, by_name }
    }

    /// Pages in scan order
    pub fn pages(&self) -> &[PageImage] {
        &self.pages
    }

    pub fn page_for_line(&self, line: &Line) -> Option<&PageImage> {
        self.by_name
            .get(&normalize_image_filename(&line.page_ref))
            .map(|&i| &self.pages[i])
    }

    /// Lines transcribed from the page image with the given key, in line order
    pub fn lines_on_page<'a>(&self, key: &str, lines: &'a [Line]) -> Vec<&'a Line> {
        let Some(page) = self.pages.iter().find(|p| p.key == key) else {
            return Vec::new();
        };
        let name = normalize_image_filename(&page.image_filename);
        lines
            .iter()
            .filter(|l| normalize_image_filename(&l.page_ref) == name)
            .collect()
    }
}
