//! Editor session for one open note.
//!
//! The session owns the draft (title and content), the auto-save debounce
//! and the save state machine:
//!
//! ```text
//! Clean --edit--> Dirty --idle 2s / manual--> Saving --ok--> Clean
//!                   ^                            |
//!                   +-----------fail-------------+
//! ```
//!
//! Saving is split in two halves so the network call can happen outside the
//! session: [`EditorSession::begin_save`] produces a [`SaveRequest`] stamped
//! with the session epoch, and [`EditorSession::finish_save`] applies the
//! outcome only if the same note is still open.

use std::ops::Range;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::debounce::Debounce;
use crate::error::ClientError;
use crate::models::{Note, NoteId, NotePatch};
use crate::notes::{char_count, render_preview, word_count};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorStatus {
    Clean,
    Dirty,
    Saving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveTarget {
    Create,
    Update(NoteId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub epoch: u64,
    pub revision: u64,
    pub target: SaveTarget,
    pub patch: NotePatch,
    pub trigger: SaveTrigger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved,
    /// Saved, but the draft changed while the request was in flight.
    SavedWithPendingEdits,
    Failed(String),
    /// A different note was opened meanwhile; nothing was applied.
    Stale,
}

// ============================================================================
// Markdown Toolbar
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snippet {
    Bold,
    Italic,
    Code,
    Link,
    List,
    Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorAction {
    Insert(Snippet),
    Save,
}

/// Ctrl/Cmd shortcuts.
pub fn shortcut(key: char) -> Option<EditorAction> {
    match key {
        'b' => Some(EditorAction::Insert(Snippet::Bold)),
        'i' => Some(EditorAction::Insert(Snippet::Italic)),
        '`' => Some(EditorAction::Insert(Snippet::Code)),
        'k' => Some(EditorAction::Insert(Snippet::Link)),
        's' => Some(EditorAction::Save),
        _ => None,
    }
}

fn prefix_lines(text: &str, prefix: &str) -> String {
    text.split('\n')
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replacement text for `selected` and the cursor offset (in chars) from
/// the start of the selection.
pub fn snippet_text(snippet: Snippet, selected: &str) -> (String, usize) {
    let has_selection = !selected.is_empty();
    let wrap = |marker: &str| {
        let text = format!("{m}{s}{m}", m = marker, s = selected);
        let cursor = if has_selection {
            char_count(&text)
        } else {
            char_count(marker)
        };
        (text, cursor)
    };
    match snippet {
        Snippet::Bold => wrap("**"),
        Snippet::Italic => wrap("*"),
        Snippet::Code => wrap("`"),
        Snippet::Link => {
            let label = if has_selection { selected } else { "Link text" };
            let text = format!("[{}](url)", label);
            // Lands just before "url)"
            let cursor = char_count(&text) - 4;
            (text, cursor)
        }
        Snippet::List | Snippet::Quote => {
            let prefix = if snippet == Snippet::List { "- " } else { "> " };
            let text = if has_selection {
                prefix_lines(selected, prefix)
            } else {
                prefix.to_string()
            };
            let cursor = char_count(&text);
            (text, cursor)
        }
    }
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug)]
pub struct EditorSession {
    note_id: Option<NoteId>,
    epoch: u64,
    revision: u64,
    title: String,
    content: String,
    dirty: bool,
    saving: Option<u64>,
    last_saved: Option<DateTime<Utc>>,
    last_error: Option<String>,
    autosave: Debounce,
}

impl EditorSession {
    pub fn new(auto_save_delay: Duration) -> Self {
        Self {
            note_id: None,
            epoch: 0,
            revision: 0,
            title: String::new(),
            content: String::new(),
            dirty: false,
            saving: None,
            last_saved: None,
            last_error: None,
            autosave: Debounce::new(auto_save_delay),
        }
    }

    /// Load `note` (or a blank draft) and forget everything about the
    /// previous one, including its pending auto-save.
    pub fn open(&mut self, note: Option<&Note>) {
        self.autosave.cancel();
        self.epoch += 1;
        self.revision = 0;
        self.dirty = false;
        self.saving = None;
        self.last_error = None;
        match note {
            Some(note) => {
                self.note_id = Some(note.id.clone());
                self.title = note.title.clone();
                self.content = note.content.clone();
                self.last_saved = note.updated_at;
            }
            None => {
                self.note_id = None;
                self.title.clear();
                self.content.clear();
                self.last_saved = None;
            }
        }
    }

    pub fn note_id(&self) -> Option<&NoteId> {
        self.note_id.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn status(&self) -> EditorStatus {
        if self.saving.is_some() {
            EditorStatus::Saving
        } else if self.dirty {
            EditorStatus::Dirty
        } else {
            EditorStatus::Clean
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn edited(&mut self) {
        self.revision += 1;
        self.dirty = true;
        self.autosave.touch();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.edited();
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.edited();
    }

    /// Apply a toolbar snippet over the char range `selection`. Returns the
    /// new cursor position in chars.
    pub fn insert_markdown(&mut self, snippet: Snippet, selection: Range<usize>) -> usize {
        let len = char_count(&self.content);
        let start = selection.start.min(len);
        let end = selection.end.clamp(start, len);
        let (from, to) = (byte_offset(&self.content, start), byte_offset(&self.content, end));

        let (text, cursor) = snippet_text(snippet, &self.content[from..to]);
        let mut next = String::with_capacity(self.content.len() + text.len());
        next.push_str(&self.content[..from]);
        next.push_str(&text);
        next.push_str(&self.content[to..]);
        self.set_content(next);
        start + cursor
    }

    // ------------------------------------------------------------------------
    // Auto-save timer
    // ------------------------------------------------------------------------

    pub fn autosave_pending(&self) -> bool {
        self.autosave.is_pending()
    }

    pub fn autosave_deadline(&self) -> Option<tokio::time::Instant> {
        self.autosave.deadline()
    }

    pub fn cancel_autosave(&mut self) -> bool {
        self.autosave.cancel()
    }

    /// Resolves when the idle window elapses; never resolves if nothing is pending.
    pub async fn autosave_fired(&mut self) {
        self.autosave.fired().await
    }

    // ------------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------------

    /// Start a save. Returns `None` when title and content are both blank.
    /// Any pending auto-save is cancelled either way.
    pub fn begin_save(&mut self, trigger: SaveTrigger) -> Option<SaveRequest> {
        self.autosave.cancel();
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() && content.is_empty() {
            return None;
        }

        let patch = NotePatch {
            title: Some(if title.is_empty() { "Untitled" } else { title }.to_string()),
            content: Some(content.to_string()),
            is_starred: None,
        };
        let target = match self.note_id {
            Some(ref id) => SaveTarget::Update(id.clone()),
            None => SaveTarget::Create,
        };
        self.saving = Some(self.revision);
        Some(SaveRequest {
            epoch: self.epoch,
            revision: self.revision,
            target,
            patch,
            trigger,
        })
    }

    /// Apply a save result. Responses for a note that is no longer open are ignored.
    pub fn finish_save(&mut self, request: &SaveRequest, result: Result<&Note, &ClientError>) -> SaveOutcome {
        if request.epoch != self.epoch {
            return SaveOutcome::Stale;
        }
        if self.saving == Some(request.revision) {
            self.saving = None;
        }

        match result {
            Ok(note) => {
                if self.note_id.is_none() {
                    self.note_id = Some(note.id.clone());
                }
                self.last_saved = Some(note.updated_at.unwrap_or_else(Utc::now));
                self.last_error = None;
                if self.revision == request.revision {
                    self.dirty = false;
                    SaveOutcome::Saved
                } else {
                    SaveOutcome::SavedWithPendingEdits
                }
            }
            Err(e) => {
                let message = e.user_message();
                self.dirty = true;
                self.last_error = Some(message.clone());
                SaveOutcome::Failed(message)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------------

    pub fn char_count(&self) -> usize {
        char_count(&self.content)
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }

    pub fn preview(&self, notes: &[Note]) -> String {
        render_preview(&self.content, notes)
    }
}
