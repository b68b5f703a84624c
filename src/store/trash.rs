use chrono::{DateTime, Local};

use crate::model::{Footnote, Line, Witness};

const MAX_TRASH_SIZE: usize = 100;

/// A line removed by the user, together with the footnotes anchored on it
#[derive(Debug, Clone)]
pub struct DeletedLine {
    pub witness: Witness,
    pub line: Line,
    pub footnotes: Vec<Footnote>,
    pub deleted_at: DateTime<Local>,
}

/// A footnote whose deletion was committed after its grace period
#[derive(Debug, Clone)]
pub struct DeletedFootnote {
    pub footnote: Footnote,
    pub deleted_at: DateTime<Local>,
}

/// Bounded list of deleted items, newest last
#[derive(Debug)]
pub struct Trash<T> {
    entries: Vec<T>,
}

impl<T> Trash<T> {
    pub fn new() -> Self {
        Trash {
            entries: Vec::new(),
        }
    }

    /// Add a deleted item, dropping the oldest once the trash is full
    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
        if self.entries.len() > MAX_TRASH_SIZE {
            self.entries.remove(0);
        }
    }

    /// Remove and return the most recent entry matching the predicate
    pub fn take(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let idx = self.entries.iter().rposition(|e| pred(e))?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Trash<T> {
    fn default() -> Self {
        Self::new()
    }
}
