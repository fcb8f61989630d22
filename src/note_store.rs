//! Session-local note collection.
//!
//! Every mutation round-trips through the backend first; local state only
//! ever reflects confirmed results, so there is nothing to roll back on
//! failure. The `apply_*` functions are the reconciliation half and can be
//! called directly by a host that performed the request itself.

use std::sync::Arc;

use crate::backend::NoteBackend;
use crate::error::{ClientError, Result};
use crate::models::{Note, NoteDraft, NoteId, NotePatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteCounts {
    pub total: usize,
    pub starred: usize,
}

pub struct NoteStore<B: ?Sized> {
    backend: Arc<B>,
    notes: Vec<Note>,
    selected: Option<NoteId>,
}

impl<B: NoteBackend + ?Sized> NoteStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            notes: Vec::new(),
            selected: None,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub fn selected_id(&self) -> Option<&NoteId> {
        self.selected.as_ref()
    }

    pub fn selected(&self) -> Option<&Note> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn starred(&self) -> Vec<&Note> {
        self.notes.iter().filter(|n| n.is_starred).collect()
    }

    pub fn counts(&self) -> NoteCounts {
        NoteCounts {
            total: self.notes.len(),
            starred: self.notes.iter().filter(|n| n.is_starred).count(),
        }
    }

    /// Select a note by id, or clear the selection. Unknown ids are refused.
    pub fn select(&mut self, id: Option<&NoteId>) -> bool {
        match id {
            Some(id) if self.get(id).is_none() => false,
            Some(id) => {
                self.selected = Some(id.clone());
                true
            }
            None => {
                self.selected = None;
                true
            }
        }
    }

    // ========================================================================
    // Backend round-trips
    // ========================================================================

    /// Replace the collection with the backend's list.
    pub async fn load(&mut self) -> Result<()> {
        let notes = self.backend.list_notes().await?;
        tracing::info!(count = notes.len(), "notes loaded");
        self.replace_all(notes);
        Ok(())
    }

    /// Refresh one note from the backend.
    pub async fn fetch(&mut self, id: &NoteId) -> Result<Note> {
        let note = self.backend.get_note(id).await?;
        if !self.apply_updated(note.clone()) {
            self.notes.push(note.clone());
        }
        Ok(note)
    }

    /// Create on the backend, then prepend and select the confirmed note.
    pub async fn create(&mut self, draft: &NoteDraft) -> Result<Note> {
        let note = self.backend.create_note(&draft.to_payload()).await?;
        self.apply_created(note.clone(), true);
        Ok(note)
    }

    /// Send `patch` merged over the current note, then replace it in place.
    pub async fn update(&mut self, id: &NoteId, patch: &NotePatch) -> Result<Note> {
        let payload = patch.apply_to(self.get(id));
        let note = self.backend.update_note(id, &payload).await?;
        self.apply_updated(note.clone());
        Ok(note)
    }

    pub async fn delete(&mut self, id: &NoteId) -> Result<()> {
        self.backend.delete_note(id).await?;
        self.apply_deleted(id);
        Ok(())
    }

    pub async fn toggle_star(&mut self, id: &NoteId) -> Result<Note> {
        if self.get(id).is_none() {
            return Err(ClientError::not_found(format!("note {}", id)));
        }
        let note = self.backend.toggle_star(id).await?;
        self.apply_updated(note.clone());
        Ok(note)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    pub fn replace_all(&mut self, notes: Vec<Note>) {
        self.notes = notes;
        if self.selected.as_ref().is_some_and(|id| self.get(id).is_none()) {
            self.selected = None;
        }
    }

    pub fn apply_created(&mut self, note: Note, select: bool) {
        tracing::info!(id = %note.id, title = %note.title, "note created");
        self.notes.retain(|n| n.id != note.id);
        if select {
            self.selected = Some(note.id.clone());
        }
        self.notes.insert(0, note);
    }

    /// Replace the entry with the same id. Returns false if it is not held.
    pub fn apply_updated(&mut self, note: Note) -> bool {
        match self.notes.iter_mut().find(|n| n.id == note.id) {
            Some(slot) => {
                tracing::info!(id = %note.id, "note updated");
                *slot = note;
                true
            }
            None => false,
        }
    }

    /// Remove the entry; the selection is cleared only if it was this note.
    pub fn apply_deleted(&mut self, id: &NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| &n.id != id);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        let removed = self.notes.len() != before;
        if removed {
            tracing::info!(id = %id, "note deleted");
        }
        removed
    }
}
