// Document state store
// Owns the per-witness line arrays, the footnote list and the derived pages. All edits go
// through this API, which re-derives token indices and pages from the canonical text.

pub mod save_tracker;
pub mod trash;

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use uuid::Uuid;

use crate::apparatus::block::{number_entries, ApparatusEntry};
use crate::apparatus::footnote_merge::merge_footnotes;
use crate::apparatus::markup::{escape_html, LineMarkup};
use crate::apparatus::selection::SelectionAction;
use crate::apparatus::span_resolver::resolve_line;
use crate::config::Settings;
use crate::error::{Result, TahkikError};
use crate::model::{ErrorSpan, ErrorSpanSet, Footnote, FootnoteKind, Line, LineNo, Witness};
use crate::page_index::{PageImage, PageIndex};
use crate::pagination::{footnotes_by_line, paginate, Page};
use crate::playback::PlaybackPosition;
use crate::records::{FootnoteRecord, LineRecord, PageRecord, ProjectBundle};
use crate::tokenizer::{split_parts, token_count, words, TokenIndex};

use save_tracker::{SaveStatus, SaveTracker};
use trash::{DeletedFootnote, DeletedLine, Trash};

/// Outbound change for the persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    UpdateLine {
        line_no: LineNo,
        new_text: String,
        nusha_index: u8,
    },
    CreateFootnote(FootnoteRecord),
    UpdateFootnote(FootnoteRecord),
    DeleteFootnote {
        id: Uuid,
    },
    DeleteLine {
        line_no: LineNo,
        nusha_index: u8,
    },
    RestoreLine {
        line_no: LineNo,
        nusha_index: u8,
    },
}

/// User-supplied part of a new footnote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteDraft {
    pub kind: FootnoteKind,
    pub witness: Witness,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    FootnoteCreated(Uuid),
    LinesMerged(LineNo),
}

/// A page ready for display: line markup plus its numbered apparatus
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub key: String,
    pub lines: Vec<LineMarkup>,
    pub apparatus: Vec<ApparatusEntry>,
}

impl RenderedPage {
    pub fn to_html(&self) -> String {
        let mut out = format!("<section class=\"page\" data-page=\"{}\">\n", self.key);
        for line in &self.lines {
            out.push_str("  <p>");
            out.push_str(&line.to_html());
            out.push_str("</p>\n");
        }
        if !self.apparatus.is_empty() {
            out.push_str("  <div class=\"apparatus\">\n");
            for entry in &self.apparatus {
                out.push_str(&format!(
                    "    <p data-footnote=\"{}\">{}</p>\n",
                    entry.footnote_id,
                    escape_html(&entry.to_string())
                ));
            }
            out.push_str("  </div>\n");
        }
        out.push_str("</section>\n");
        out
    }
}

/// Where a global token lives in each view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLocation {
    pub token: usize,
    pub line_no: LineNo,
    pub word_in_line: usize,
    /// Character range of the word within the line
    pub char_start: usize,
    pub char_end: usize,
    pub page_key: Option<String>,
    pub image: Option<PageImage>,
}

#[derive(Debug, Clone, Copy)]
struct PendingDelete {
    footnote_id: Uuid,
    deadline: Instant,
}

pub struct DocumentStore {
    witnesses: BTreeMap<Witness, Vec<Line>>,
    active: Witness,
    token_index: TokenIndex,
    footnotes: Vec<Footnote>,
    pending_deletes: Vec<PendingDelete>,
    page_index: PageIndex,
    settings: Settings,
    pages: Vec<Page>,
    line_trash: Trash<DeletedLine>,
    footnote_trash: Trash<DeletedFootnote>,
    saves: SaveTracker,
    footnote_errors: HashMap<Uuid, String>,
    outbox: Vec<Change>,
}

impl DocumentStore {
    pub fn new(settings: Settings) -> Self {
        DocumentStore {
            witnesses: BTreeMap::new(),
            active: Witness::default(),
            token_index: TokenIndex::default(),
            footnotes: Vec::new(),
            pending_deletes: Vec::new(),
            page_index: PageIndex::default(),
            settings,
            pages: Vec::new(),
            line_trash: Trash::new(),
            footnote_trash: Trash::new(),
            saves: SaveTracker::new(),
            footnote_errors: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    /// Open a project from its collaborator records
    pub fn from_bundle(bundle: ProjectBundle, settings: Settings) -> Result<Self> {
        let mut store = DocumentStore::new(settings);
        for (index, records) in bundle.witnesses {
            store.load_witness(Witness::new(index)?, records);
        }
        store.set_page_index(bundle.pages);
        store.load_footnotes(bundle.footnotes)?;
        Ok(store)
    }

    // ---- loading ----

    /// Replace a witness's lines. Lines are kept in `line_no` order.
    pub fn load_witness(&mut self, witness: Witness, records: Vec<LineRecord>) {
        let hints: Vec<(LineNo, usize)> = records
            .iter()
            .filter_map(|r| r.best.start_word.map(|w| (r.line_no, w)))
            .collect();

        let mut lines: Vec<Line> = records.into_iter().map(LineRecord::into_line).collect();
        lines.sort_by_key(|l| l.line_no);
        self.witnesses.insert(witness, lines);

        if witness == self.active {
            self.refresh();
            for (line_no, hint) in hints {
                if self.token_index.start_token(line_no) != Some(hint) {
                    tracing::warn!(
                        line_no,
                        hint,
                        derived = ?self.token_index.start_token(line_no),
                        "aligner start_word disagrees with derived start token"
                    );
                }
            }
        }
    }

    pub fn load_footnotes(&mut self, records: Vec<FootnoteRecord>) -> Result<()> {
        self.footnotes = records
            .into_iter()
            .map(FootnoteRecord::into_footnote)
            .collect::<Result<_>>()?;
        self.pending_deletes.clear();
        self.repaginate();
        Ok(())
    }

    pub fn set_page_index(&mut self, records: Vec<PageRecord>) {
        self.page_index = PageIndex::from_records(records);
    }

    pub fn set_active_witness(&mut self, witness: Witness) {
        if self.active != witness {
            self.active = witness;
            self.refresh();
        }
    }

    pub fn set_font_size(&mut self, font_size: f32) -> Result<()> {
        if !(font_size.is_finite() && font_size > 0.0) {
            return Err(TahkikError::InvalidFontSize(font_size));
        }
        self.settings.font_size = font_size;
        self.repaginate();
        Ok(())
    }

    // ---- accessors ----

    pub fn active_witness(&self) -> Witness {
        self.active
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Lines of the active witness
    pub fn lines(&self) -> &[Line] {
        self.witnesses
            .get(&self.active)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn line(&self, line_no: LineNo) -> Option<&Line> {
        self.lines().iter().find(|l| l.line_no == line_no)
    }

    pub fn token_index(&self) -> &TokenIndex {
        &self.token_index
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_index(&self) -> &PageIndex {
        &self.page_index
    }

    /// Footnotes not hidden by a pending deletion
    pub fn visible_footnotes(&self) -> Vec<&Footnote> {
        self.footnotes
            .iter()
            .filter(|f| !self.is_pending_delete(f.id))
            .collect()
    }

    /// Visible footnotes of a line, ordered by char_offset
    pub fn footnotes_for_line(&self, line_no: LineNo) -> Vec<&Footnote> {
        let mut notes: Vec<&Footnote> = self
            .visible_footnotes()
            .into_iter()
            .filter(|f| f.line_no == line_no)
            .collect();
        notes.sort_by_key(|f| f.char_offset);
        notes
    }

    pub fn footnote(&self, id: Uuid) -> Option<&Footnote> {
        self.footnotes.iter().find(|f| f.id == id)
    }

    pub fn deleted_lines(&self) -> impl Iterator<Item = &DeletedLine> {
        self.line_trash.iter()
    }

    pub fn deleted_footnotes(&self) -> impl Iterator<Item = &DeletedFootnote> {
        self.footnote_trash.iter()
    }

    pub fn pending_deletions(&self) -> Vec<Uuid> {
        self.pending_deletes.iter().map(|p| p.footnote_id).collect()
    }

    // ---- derivation ----

    fn refresh(&mut self) {
        let lines = self.witnesses.entry(self.active).or_default();
        self.token_index = TokenIndex::rebuild(lines);
        self.repaginate();
    }

    fn repaginate(&mut self) {
        let visible: Vec<Footnote> = self.visible_footnotes().into_iter().cloned().collect();
        self.pages = paginate(
            self.lines(),
            &visible,
            self.settings.font_size,
            &self.settings.layout,
        );
    }

    fn is_pending_delete(&self, id: Uuid) -> bool {
        self.pending_deletes.iter().any(|p| p.footnote_id == id)
    }

    fn active_lines_mut(&mut self) -> &mut Vec<Line> {
        self.witnesses.entry(self.active).or_default()
    }

    fn line_len(&self, line_no: LineNo) -> Result<usize> {
        self.line(line_no)
            .map(Line::char_len)
            .ok_or(TahkikError::UnknownLine(line_no))
    }

    /// Whether a witness other than the active one still has this line
    fn shown_elsewhere(&self, line_no: LineNo) -> bool {
        self.witnesses
            .iter()
            .any(|(w, lines)| *w != self.active && lines.iter().any(|l| l.line_no == line_no))
    }

    /// Longest text of a line across every witness that has it
    fn longest_line_len(&self, line_no: LineNo) -> Option<usize> {
        self.witnesses
            .values()
            .flat_map(|lines| lines.iter().filter(|l| l.line_no == line_no))
            .map(Line::char_len)
            .max()
    }

    /// Pull footnotes of a line back to `len`, queueing an update for each one moved
    fn clamp_footnotes(&mut self, line_no: LineNo, len: usize) {
        for note in self.footnotes.iter_mut().filter(|f| f.line_no == line_no) {
            if note.char_offset > len {
                tracing::warn!(id = %note.id, from = note.char_offset, to = len, "clamping footnote after edit");
                note.char_offset = len;
                self.outbox.push(Change::UpdateFootnote(FootnoteRecord::from(&*note)));
            }
        }
    }

    /// Re-key the error spans of the active lines from position `from` on
    fn shift_spans_from(&mut self, from: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        for line in self.active_lines_mut().iter_mut().skip(from) {
            line.error_spans.shift(delta);
        }
    }

    // ---- line edits ----

    /// Replace a line's text (sent on blur).
    ///
    /// Error spans of later lines follow their words when the word count changes; the
    /// line's own spans are dropped once its words differ. Footnotes are shared by every
    /// witness, so they are clamped only past the longest text any witness has for the line.
    pub fn edit_line(&mut self, line_no: LineNo, new_text: &str) -> Result<()> {
        let witness = self.active;
        let lines = self.active_lines_mut();
        let idx = lines
            .iter()
            .position(|l| l.line_no == line_no)
            .ok_or(TahkikError::UnknownLine(line_no))?;
        let line = &mut lines[idx];
        if line.raw_text == new_text {
            return Ok(());
        }

        let old_count = token_count(&line.raw_text);
        if !words(&line.raw_text).eq(words(new_text)) && !line.error_spans.is_empty() {
            tracing::debug!(line_no, spans = line.error_spans.len(), "dropping error spans of edited words");
            line.error_spans = ErrorSpanSet::new();
        }
        line.raw_text = new_text.to_string();
        let delta = token_count(new_text) as isize - old_count as isize;
        self.shift_spans_from(idx + 1, delta);

        if let Some(len) = self.longest_line_len(line_no) {
            self.clamp_footnotes(line_no, len);
        }

        self.saves.record_edit(line_no, new_text);
        self.outbox.push(Change::UpdateLine {
            line_no,
            new_text: new_text.to_string(),
            nusha_index: witness.index(),
        });
        self.refresh();
        Ok(())
    }

    /// Apply a save acknowledgement carrying the text it saved
    pub fn acknowledge_line_save(
        &mut self,
        line_no: LineNo,
        saved_text: &str,
        result: std::result::Result<(), String>,
    ) -> bool {
        self.saves.acknowledge(line_no, saved_text, result)
    }

    pub fn line_save_status(&self, line_no: LineNo) -> Option<&SaveStatus> {
        self.saves.status(line_no)
    }

    pub fn line_save_status_text(&self, line_no: LineNo) -> String {
        self.saves.status_text(line_no)
    }

    /// Move a line of the active witness to the trash. Its footnotes go with it unless
    /// another witness still shows the line.
    pub fn delete_line(&mut self, line_no: LineNo) -> Result<()> {
        let witness = self.active;
        let lines = self.active_lines_mut();
        let idx = lines
            .iter()
            .position(|l| l.line_no == line_no)
            .ok_or(TahkikError::UnknownLine(line_no))?;
        let line = lines.remove(idx);
        self.shift_spans_from(idx, -(token_count(&line.raw_text) as isize));

        let footnotes = if self.shown_elsewhere(line_no) {
            Vec::new()
        } else {
            let (gone, kept): (Vec<Footnote>, Vec<Footnote>) = std::mem::take(&mut self.footnotes)
                .into_iter()
                .partition(|f| f.line_no == line_no);
            self.footnotes = kept;
            gone
        };
        self.pending_deletes
            .retain(|p| !footnotes.iter().any(|f| f.id == p.footnote_id));
        self.saves.forget(line_no);

        tracing::info!(line_no, footnotes = footnotes.len(), "line deleted");
        self.line_trash.push(DeletedLine {
            witness,
            line,
            footnotes,
            deleted_at: Local::now(),
        });
        self.outbox.push(Change::DeleteLine {
            line_no,
            nusha_index: witness.index(),
        });
        self.refresh();
        Ok(())
    }

    pub fn restore_line(&mut self, line_no: LineNo) -> Result<()> {
        let witness = self.active;
        if self.line(line_no).is_some() {
            return Err(TahkikError::NotInTrash(format!("line {line_no}")));
        }
        let deleted = self
            .line_trash
            .take(|d| d.witness == witness && d.line.line_no == line_no)
            .ok_or_else(|| TahkikError::NotInTrash(format!("line {line_no}")))?;

        let mut line = deleted.line;
        let count = token_count(&line.raw_text);
        let lines = self.active_lines_mut();
        let idx = lines.partition_point(|l| l.line_no < line_no);
        let start: usize = lines[..idx].iter().map(|l| token_count(&l.raw_text)).sum();
        line.error_spans.shift(start as isize - line.start_token as isize);
        lines.insert(idx, line);
        self.shift_spans_from(idx + 1, count as isize);
        self.footnotes.extend(deleted.footnotes);

        tracing::info!(line_no, "line restored");
        self.outbox.push(Change::RestoreLine {
            line_no,
            nusha_index: witness.index(),
        });
        self.refresh();
        Ok(())
    }

    /// Join consecutive lines `first..=last` into `first`, separated by single spaces.
    /// Error spans of absorbed lines move onto `first` unchanged, since joining keeps every
    /// word's global index. Their footnotes move too, shifted by the preceding text, unless
    /// another witness still shows the absorbed line.
    pub fn merge_lines(&mut self, first: LineNo, last: LineNo) -> Result<()> {
        let witness = self.active;
        let lines = self.lines();
        let start = lines
            .iter()
            .position(|l| l.line_no == first)
            .ok_or(TahkikError::UnknownLine(first))?;
        let end = lines
            .iter()
            .position(|l| l.line_no == last)
            .ok_or(TahkikError::UnknownLine(last))?;
        if end <= start {
            return Err(TahkikError::InvalidMerge(first, last));
        }

        let mut merged = lines[start].raw_text.clone();
        let mut shifts: HashMap<LineNo, usize> = HashMap::new();
        let mut absorbed = Vec::new();
        for line in &lines[start + 1..=end] {
            merged.push(' ');
            shifts.insert(line.line_no, merged.chars().count());
            merged.push_str(&line.raw_text);
            absorbed.push(line.line_no);
        }

        shifts.retain(|&line_no, _| !self.shown_elsewhere(line_no));
        for note in self.footnotes.iter_mut() {
            if let Some(&shift) = shifts.get(&note.line_no) {
                note.line_no = first;
                note.char_offset += shift;
                self.outbox.push(Change::UpdateFootnote(FootnoteRecord::from(&*note)));
            }
        }

        let lines = self.active_lines_mut();
        let carried: Vec<ErrorSpan> = lines[start + 1..=end]
            .iter_mut()
            .flat_map(|l| std::mem::take(&mut l.error_spans))
            .collect();
        lines[start].error_spans.extend(carried);
        lines[start].raw_text = merged.clone();
        lines.retain(|l| !absorbed.contains(&l.line_no));

        self.saves.record_edit(first, &merged);
        self.outbox.push(Change::UpdateLine {
            line_no: first,
            new_text: merged,
            nusha_index: witness.index(),
        });
        for line_no in absorbed {
            self.saves.forget(line_no);
            self.outbox.push(Change::DeleteLine {
                line_no,
                nusha_index: witness.index(),
            });
        }

        tracing::info!(first, last, "lines merged");
        self.refresh();
        Ok(())
    }

    // ---- footnotes ----

    /// Create a footnote. Offsets outside `[0, line length]` are rejected without changes.
    pub fn add_footnote(
        &mut self,
        line_no: LineNo,
        char_offset: usize,
        draft: FootnoteDraft,
    ) -> Result<Uuid> {
        let len = self.line_len(line_no)?;
        if char_offset > len {
            return Err(TahkikError::AnchorOutOfRange {
                offset: char_offset,
                len,
            });
        }

        let footnote = Footnote::new(line_no, char_offset, draft.kind, draft.witness, draft.content);
        let id = footnote.id;
        self.outbox.push(Change::CreateFootnote(FootnoteRecord::from(&footnote)));
        self.footnotes.push(footnote);
        self.repaginate();
        Ok(id)
    }

    /// Act on a resolved selection: annotate it (footnote after the selected text)
    /// or merge the spanned lines
    pub fn apply_selection(
        &mut self,
        action: SelectionAction,
        draft: FootnoteDraft,
    ) -> Result<SelectionOutcome> {
        match action {
            SelectionAction::Annotate { line_no, end, .. } => self
                .add_footnote(line_no, end, draft)
                .map(SelectionOutcome::FootnoteCreated),
            SelectionAction::MergeLines { first, last } => {
                self.merge_lines(first, last)?;
                Ok(SelectionOutcome::LinesMerged(first))
            }
        }
    }

    /// Edit a footnote's kind, witness and content. A pending deletion is cancelled first.
    pub fn update_footnote(&mut self, id: Uuid, draft: FootnoteDraft) -> Result<()> {
        self.undo_delete_footnote(id);
        let note = self
            .footnotes
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(TahkikError::UnknownFootnote(id))?;
        note.kind = draft.kind;
        note.witness = draft.witness;
        note.content = draft.content;
        self.outbox.push(Change::UpdateFootnote(FootnoteRecord::from(&*note)));
        self.repaginate();
        Ok(())
    }

    /// Hide a footnote now; the deletion is committed once the grace period has passed
    pub fn delete_footnote(&mut self, id: Uuid, now: Instant) -> Result<()> {
        if self.footnote(id).is_none() {
            return Err(TahkikError::UnknownFootnote(id));
        }
        if !self.is_pending_delete(id) {
            self.pending_deletes.push(PendingDelete {
                footnote_id: id,
                deadline: now + self.settings.deletion_grace(),
            });
            self.repaginate();
        }
        Ok(())
    }

    /// Cancel a pending deletion. Returns true if one was pending.
    pub fn undo_delete_footnote(&mut self, id: Uuid) -> bool {
        let before = self.pending_deletes.len();
        self.pending_deletes.retain(|p| p.footnote_id != id);
        let cancelled = self.pending_deletes.len() != before;
        if cancelled {
            self.repaginate();
        }
        cancelled
    }

    /// Commit every pending deletion whose grace period has elapsed
    pub fn commit_due_deletions(&mut self, now: Instant) -> Vec<Uuid> {
        let (due, waiting): (Vec<PendingDelete>, Vec<PendingDelete>) =
            std::mem::take(&mut self.pending_deletes)
                .into_iter()
                .partition(|p| p.deadline <= now);
        self.pending_deletes = waiting;

        let mut committed = Vec::new();
        for pending in due {
            let Some(idx) = self.footnotes.iter().position(|f| f.id == pending.footnote_id) else {
                continue;
            };
            let footnote = self.footnotes.remove(idx);
            tracing::info!(id = %footnote.id, "footnote deleted");
            self.outbox.push(Change::DeleteFootnote { id: footnote.id });
            self.footnote_errors.remove(&footnote.id);
            committed.push(footnote.id);
            self.footnote_trash.push(DeletedFootnote {
                footnote,
                deleted_at: Local::now(),
            });
        }
        committed
    }

    /// Bring back a committed footnote deletion
    pub fn restore_footnote(&mut self, id: Uuid) -> Result<()> {
        let deleted = self
            .footnote_trash
            .take(|d| d.footnote.id == id)
            .ok_or_else(|| TahkikError::NotInTrash(format!("footnote {id}")))?;
        let mut footnote = deleted.footnote;

        let Some(len) = self.longest_line_len(footnote.line_no) else {
            let line_no = footnote.line_no;
            self.footnote_trash.push(DeletedFootnote {
                footnote,
                deleted_at: deleted.deleted_at,
            });
            return Err(TahkikError::UnknownLine(line_no));
        };
        footnote.char_offset = footnote.char_offset.min(len);

        tracing::info!(%id, "footnote restored");
        self.outbox.push(Change::CreateFootnote(FootnoteRecord::from(&footnote)));
        self.footnotes.push(footnote);
        self.repaginate();
        Ok(())
    }

    /// Record a failed footnote request; local state stays as is until retried
    pub fn report_footnote_failure(&mut self, id: Uuid, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%id, %message, "footnote request failed");
        self.footnote_errors.insert(id, message);
    }

    pub fn acknowledge_footnote(&mut self, id: Uuid) {
        self.footnote_errors.remove(&id);
    }

    pub fn footnote_error(&self, id: Uuid) -> Option<&str> {
        self.footnote_errors.get(&id).map(String::as_str)
    }

    /// Take every queued change for the persistence collaborator
    pub fn drain_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.outbox)
    }

    // ---- rendering ----

    /// Markup of one line with its footnote markers, numbered from `first_number`
    pub fn render_line(
        &self,
        line_no: LineNo,
        playback: PlaybackPosition,
        first_number: usize,
    ) -> Result<LineMarkup> {
        let line = self.line(line_no).ok_or(TahkikError::UnknownLine(line_no))?;
        let notes: Vec<Footnote> = self
            .footnotes_for_line(line_no)
            .into_iter()
            .cloned()
            .collect();
        Ok(merge_footnotes(resolve_line(line, playback), &notes, first_number))
    }

    /// Render a derived page; footnote numbering restarts at 1 on each page
    pub fn render_page(&self, page: usize, playback: PlaybackPosition) -> Option<RenderedPage> {
        let page = self.pages.get(page)?;
        let by_line = footnotes_by_line(&page.footnotes);

        let mut number = 1;
        let mut lines = Vec::with_capacity(page.lines.len());
        let mut ordered: Vec<&Footnote> = Vec::new();
        for line in &page.lines {
            let notes: Vec<&Footnote> = by_line.get(&line.line_no).cloned().unwrap_or_default();
            let owned: Vec<Footnote> = notes.iter().map(|&f| f.clone()).collect();
            lines.push(merge_footnotes(resolve_line(line, playback), &owned, number));
            number += notes.len();
            ordered.extend(notes);
        }

        Some(RenderedPage {
            key: page.key.clone(),
            lines,
            apparatus: number_entries(ordered, 1),
        })
    }

    /// Resolve a global token to its line, word, virtual page and page image
    pub fn locate_token(&self, token: usize) -> Option<TokenLocation> {
        let (line_no, word_in_line) = self.token_index.line_for_token(token)?;
        let line = self.line(line_no)?;
        let part = split_parts(&line.raw_text)
            .into_iter()
            .filter(|p| p.is_word)
            .nth(word_in_line)?;

        Some(TokenLocation {
            token,
            line_no,
            word_in_line,
            char_start: part.char_start,
            char_end: part.char_end(),
            page_key: self
                .pages
                .iter()
                .find(|p| p.contains_line(line_no))
                .map(|p| p.key.clone()),
            image: self.page_index.page_for_line(line).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apparatus::markup::Leaf;
    use crate::records::BestMatch;
    use std::time::Duration;

    fn record(line_no: LineNo, raw: &str) -> LineRecord {
        LineRecord {
            line_no,
            best: BestMatch {
                raw: raw.to_string(),
                start_word: None,
            },
            line_marks: Vec::new(),
            page_image: format!("{:04}.jpg", 1 + line_no / 10),
            bbox: None,
        }
    }

    fn draft(content: &str) -> FootnoteDraft {
        FootnoteDraft {
            kind: FootnoteKind::Variation,
            witness: Witness::new(2).unwrap(),
            content: content.to_string(),
        }
    }

    fn marked(line_no: LineNo, raw: &str, tokens: &[usize]) -> LineRecord {
        let mut record = record(line_no, raw);
        record.line_marks = tokens
            .iter()
            .map(|&t| ErrorSpan {
                global_token_index: t,
                sources: ["ocr".to_string()].into(),
                wrong: String::new(),
                suggestion: String::new(),
                reason: String::new(),
            })
            .collect();
        record
    }

    fn styled_words(store: &DocumentStore, line_no: LineNo) -> Vec<String> {
        store
            .render_line(line_no, PlaybackPosition::none(), 1)
            .unwrap()
            .leaves()
            .iter()
            .filter_map(|l| match l {
                Leaf::Token { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn store() -> DocumentStore {
        let mut store = DocumentStore::new(Settings::default());
        store.load_witness(
            Witness::default(),
            vec![record(3, "gamma delta"), record(1, "alpha beta"), record(2, "")],
        );
        store
    }

    #[test]
    fn test_load_sorts_and_indexes() {
        let store = store();
        let order: Vec<LineNo> = store.lines().iter().map(|l| l.line_no).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(store.line(3).unwrap().start_token, 2);
        assert_eq!(store.pages().len(), 1);
    }

    #[test]
    fn test_edit_reindexes_and_queues() {
        let mut store = store();
        store.edit_line(1, "alpha beta extra").unwrap();
        assert_eq!(store.line(3).unwrap().start_token, 3);
        assert_eq!(
            store.drain_changes(),
            vec![Change::UpdateLine {
                line_no: 1,
                new_text: "alpha beta extra".to_string(),
                nusha_index: 1
            }]
        );
        // Unchanged text is not re-sent
        store.edit_line(1, "alpha beta extra").unwrap();
        assert!(store.drain_changes().is_empty());
        assert!(matches!(store.edit_line(9, "x"), Err(TahkikError::UnknownLine(9))));
    }

    #[test]
    fn test_edit_clamps_footnotes() {
        let mut store = store();
        let id = store.add_footnote(1, 10, draft("x")).unwrap();
        store.drain_changes();

        store.edit_line(1, "alpha").unwrap();
        let changes = store.drain_changes();
        let note = store.footnote(id).unwrap();
        assert_eq!(note.char_offset, 5);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], Change::UpdateFootnote(FootnoteRecord::from(note)));
    }

    #[test]
    fn test_edit_keeps_later_spans_on_their_words() {
        let mut store = DocumentStore::new(Settings::default());
        store.load_witness(
            Witness::default(),
            vec![record(1, "alpha beta"), marked(2, "gamma delta", &[3])],
        );
        assert_eq!(styled_words(&store, 2), vec!["delta"]);

        store.edit_line(1, "alpha beta extra").unwrap();
        assert_eq!(store.line(2).unwrap().start_token, 3);
        assert_eq!(styled_words(&store, 2), vec!["delta"]);

        store.edit_line(1, "alpha").unwrap();
        assert_eq!(styled_words(&store, 2), vec!["delta"]);
    }

    #[test]
    fn test_edit_drops_own_spans_when_words_change() {
        let mut store = DocumentStore::new(Settings::default());
        store.load_witness(Witness::default(), vec![marked(1, "alpha beta", &[1])]);

        store.edit_line(1, "alpha  beta ").unwrap();
        assert_eq!(styled_words(&store, 1), vec!["beta"]);

        store.edit_line(1, "alpha beat").unwrap();
        assert!(styled_words(&store, 1).is_empty());
    }

    #[test]
    fn test_delete_and_restore_line_keep_spans_aligned() {
        let mut store = DocumentStore::new(Settings::default());
        store.load_witness(
            Witness::default(),
            vec![
                record(1, "alpha beta"),
                marked(2, "gamma delta", &[3]),
                marked(3, "epsilon zeta", &[5]),
            ],
        );

        store.delete_line(1).unwrap();
        assert_eq!(styled_words(&store, 2), vec!["delta"]);
        assert_eq!(styled_words(&store, 3), vec!["zeta"]);

        // Line 2 comes back after line 1 lost a word
        store.restore_line(1).unwrap();
        store.delete_line(2).unwrap();
        store.edit_line(1, "alpha").unwrap();
        store.restore_line(2).unwrap();
        assert_eq!(store.line(2).unwrap().start_token, 1);
        assert_eq!(styled_words(&store, 2), vec!["delta"]);
        assert_eq!(styled_words(&store, 3), vec!["zeta"]);
    }

    #[test]
    fn test_edit_in_other_witness_keeps_shared_footnote() {
        let mut store = store();
        store.load_witness(Witness::new(2).unwrap(), vec![record(1, "alfa")]);
        let id = store.add_footnote(1, 10, draft("x")).unwrap();
        store.drain_changes();

        store.set_active_witness(Witness::new(2).unwrap());
        store.edit_line(1, "alf").unwrap();
        assert_eq!(store.footnote(id).unwrap().char_offset, 10);
        assert_eq!(
            store.drain_changes(),
            vec![Change::UpdateLine {
                line_no: 1,
                new_text: "alf".to_string(),
                nusha_index: 2
            }]
        );

        // Shortened in every witness: clamp to the longest remaining text
        store.set_active_witness(Witness::default());
        store.edit_line(1, "alpha").unwrap();
        assert_eq!(store.footnote(id).unwrap().char_offset, 5);
    }

    #[test]
    fn test_delete_in_other_witness_keeps_shared_footnotes() {
        let mut store = store();
        store.load_witness(Witness::new(2).unwrap(), vec![record(1, "alfa")]);
        store.add_footnote(1, 5, draft("x")).unwrap();

        store.set_active_witness(Witness::new(2).unwrap());
        store.delete_line(1).unwrap();
        assert!(store.line(1).is_none());
        assert_eq!(store.deleted_lines().next().unwrap().footnotes.len(), 0);

        store.set_active_witness(Witness::default());
        assert_eq!(store.footnotes_for_line(1).len(), 1);
        let markup = store.render_line(1, PlaybackPosition::none(), 1).unwrap();
        assert_eq!(markup.marker_count(), 1);

        store.set_active_witness(Witness::new(2).unwrap());
        store.restore_line(1).unwrap();
        assert_eq!(store.visible_footnotes().len(), 1);
    }

    #[test]
    fn test_add_footnote_rejects_out_of_range() {
        let mut store = store();
        let err = store.add_footnote(1, 11, draft("x")).unwrap_err();
        assert!(matches!(err, TahkikError::AnchorOutOfRange { offset: 11, len: 10 }));
        assert!(store.drain_changes().is_empty());
        assert!(store.visible_footnotes().is_empty());
    }

    #[test]
    fn test_delete_grace_period() {
        let mut store = store();
        let id = store.add_footnote(1, 5, draft("x")).unwrap();
        store.drain_changes();

        let t0 = Instant::now();
        store.delete_footnote(id, t0).unwrap();
        assert!(store.footnotes_for_line(1).is_empty());
        assert!(store.commit_due_deletions(t0 + Duration::from_secs(4)).is_empty());
        assert!(store.drain_changes().is_empty());

        assert_eq!(store.commit_due_deletions(t0 + Duration::from_secs(5)), vec![id]);
        assert_eq!(store.drain_changes(), vec![Change::DeleteFootnote { id }]);
        assert_eq!(store.deleted_footnotes().count(), 1);

        store.restore_footnote(id).unwrap();
        assert_eq!(store.footnotes_for_line(1).len(), 1);
        assert!(matches!(store.drain_changes()[0], Change::CreateFootnote(_)));
    }

    #[test]
    fn test_undo_and_edit_cancel_pending_delete() {
        let mut store = store();
        let id = store.add_footnote(1, 5, draft("x")).unwrap();
        let t0 = Instant::now();

        store.delete_footnote(id, t0).unwrap();
        assert!(store.undo_delete_footnote(id));
        assert_eq!(store.footnotes_for_line(1).len(), 1);

        store.delete_footnote(id, t0).unwrap();
        store.update_footnote(id, draft("y")).unwrap();
        assert!(store.pending_deletions().is_empty());
        assert!(store.commit_due_deletions(t0 + Duration::from_secs(60)).is_empty());
        assert_eq!(store.footnote(id).unwrap().content, "y");
    }

    #[test]
    fn test_delete_and_restore_line() {
        let mut store = store();
        store.add_footnote(3, 0, draft("x")).unwrap();
        store.delete_line(3).unwrap();
        assert!(store.line(3).is_none());
        assert!(store.visible_footnotes().is_empty());
        assert_eq!(store.deleted_lines().count(), 1);

        store.restore_line(3).unwrap();
        let order: Vec<LineNo> = store.lines().iter().map(|l| l.line_no).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(store.footnotes_for_line(3).len(), 1);
        assert!(store.restore_line(3).is_err());
    }

    #[test]
    fn test_merge_lines_shifts_footnotes() {
        let mut store = store();
        let id = store.add_footnote(3, 5, draft("x")).unwrap();
        store.drain_changes();

        store.merge_lines(1, 3).unwrap();
        // "alpha beta" + " " + "" + " " + "gamma delta"
        assert_eq!(store.line(1).unwrap().raw_text, "alpha beta  gamma delta");
        assert_eq!(store.lines().len(), 1);
        let note = store.footnote(id).unwrap();
        assert_eq!((note.line_no, note.char_offset), (1, 17));

        let changes = store.drain_changes();
        assert!(matches!(changes[0], Change::UpdateFootnote(_)));
        assert!(changes.contains(&Change::DeleteLine {
            line_no: 2,
            nusha_index: 1
        }));
        assert!(store.merge_lines(1, 1).is_err());
    }

    #[test]
    fn test_merge_lines_carries_spans() {
        let mut store = DocumentStore::new(Settings::default());
        store.load_witness(
            Witness::default(),
            vec![
                marked(1, "alpha beta", &[1]),
                marked(2, "gamma delta", &[3]),
                marked(3, "epsilon", &[4]),
            ],
        );

        store.merge_lines(1, 2).unwrap();
        assert_eq!(styled_words(&store, 1), vec!["beta", "delta"]);
        assert_eq!(styled_words(&store, 3), vec!["epsilon"]);
    }

    #[test]
    fn test_locate_token() {
        let mut store = store();
        store.set_page_index(vec![PageRecord {
            key: "scan-1".to_string(),
            index: 0,
            image_filename: "0001.JPG".to_string(),
        }]);
        let loc = store.locate_token(3).unwrap();
        assert_eq!((loc.line_no, loc.word_in_line), (3, 1));
        assert_eq!((loc.char_start, loc.char_end), (6, 11));
        assert_eq!(loc.page_key.as_deref(), Some("page-1"));
        assert_eq!(loc.image.unwrap().key, "scan-1");
        assert!(store.locate_token(4).is_none());
    }

    #[test]
    fn test_font_size_repaginates() {
        let mut store = store();
        assert!(store.set_font_size(0.0).is_err());
        store.set_font_size(400.0).unwrap();
        assert_eq!(store.pages().len(), 3);
    }
}
