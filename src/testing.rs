//! In-memory backend for unit tests.
//!
//! Implements both backend traits over plain vectors, counts calls per
//! operation and can be told to fail or stall specific operations.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::backend::{NoteBackend, ReminderBackend};
use crate::error::{ClientError, Result};
use crate::models::{EntityId, Note, NoteId, NotePayload, Reminder, ReminderId, ReminderPayload};
use crate::notes::local_matches;
use crate::notify::{Notification, NotificationSink, Toast};

#[derive(Default)]
struct State {
    notes: Vec<Note>,
    reminders: Vec<Reminder>,
    next_id: i64,
    tick: i64,
    calls: HashMap<&'static str, usize>,
    failing: HashSet<&'static str>,
    delays: HashMap<&'static str, Duration>,
    search_results: Option<Vec<Note>>,
    signed_out: bool,
}

impl State {
    fn next_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId::Int(self.next_id)
    }

    /// Strictly increasing timestamps so recency ordering is deterministic.
    fn now(&mut self) -> DateTime<Utc> {
        self.tick += 1;
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(self.tick)
    }
}

pub struct MemoryBackend {
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Reminder operations answer `NotAuthenticated`, like a client with no token.
    pub fn signed_out() -> Self {
        let backend = Self::new();
        backend.lock().signed_out = true;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert_note(&self, title: &str, content: &str) -> Note {
        let mut s = self.lock();
        let id = s.next_id();
        let at = s.now();
        let note = Note {
            id,
            title: title.to_string(),
            content: content.to_string(),
            is_starred: false,
            created_at: Some(at),
            updated_at: Some(at),
        };
        s.notes.push(note.clone());
        note
    }

    pub fn remove_note(&self, id: &NoteId) {
        self.lock().notes.retain(|n| &n.id != id);
    }

    pub fn note(&self, id: &NoteId) -> Option<Note> {
        self.lock().notes.iter().find(|n| &n.id == id).cloned()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.lock().notes.clone()
    }

    pub fn insert_reminder(&self, note_id: &NoteId, message: &str, at: DateTime<Utc>) -> Reminder {
        let mut s = self.lock();
        let id = s.next_id();
        let reminder = Reminder {
            id,
            note_id: Some(note_id.clone()),
            note_title: s.notes.iter().find(|n| &n.id == note_id).map(|n| n.title.clone()),
            message: message.to_string(),
            reminder_time: at,
            is_sent: false,
        };
        s.reminders.push(reminder.clone());
        reminder
    }

    pub fn reminders(&self) -> Vec<Reminder> {
        self.lock().reminders.clone()
    }

    pub fn fail(&self, op: &'static str) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.lock().failing.remove(op);
    }

    pub fn delay(&self, op: &'static str, by: Duration) {
        self.lock().delays.insert(op, by);
    }

    pub fn set_search_results(&self, notes: Vec<Note>) {
        self.lock().search_results = Some(notes);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        let (delay, failing) = {
            let mut s = self.lock();
            *s.calls.entry(op).or_default() += 1;
            (s.delays.get(op).copied(), s.failing.contains(op))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(ClientError::Server {
                status: 500,
                message: format!("{} failed", op),
            });
        }
        Ok(())
    }

    async fn enter_authenticated(&self, op: &'static str) -> Result<()> {
        if self.lock().signed_out {
            return Err(ClientError::NotAuthenticated);
        }
        self.enter(op).await
    }
}

fn missing(kind: &str, id: &EntityId) -> ClientError {
    ClientError::not_found(format!("{} {}", kind, id))
}

#[async_trait]
impl NoteBackend for MemoryBackend {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        self.enter("list_notes").await?;
        Ok(self.notes())
    }

    async fn get_note(&self, id: &NoteId) -> Result<Note> {
        self.enter("get_note").await?;
        self.note(id).ok_or_else(|| missing("note", id))
    }

    async fn create_note(&self, payload: &NotePayload) -> Result<Note> {
        self.enter("create_note").await?;
        let mut s = self.lock();
        let id = s.next_id();
        let at = s.now();
        let note = Note {
            id,
            title: payload.title.clone(),
            content: payload.content.clone(),
            is_starred: payload.is_starred,
            created_at: Some(at),
            updated_at: Some(at),
        };
        s.notes.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, id: &NoteId, payload: &NotePayload) -> Result<Note> {
        self.enter("update_note").await?;
        let mut s = self.lock();
        let at = s.now();
        let note = s
            .notes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| missing("note", id))?;
        note.title = payload.title.clone();
        note.content = payload.content.clone();
        note.is_starred = payload.is_starred;
        note.updated_at = Some(at);
        Ok(note.clone())
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.enter("delete_note").await?;
        let mut s = self.lock();
        let before = s.notes.len();
        s.notes.retain(|n| &n.id != id);
        if s.notes.len() == before {
            return Err(missing("note", id));
        }
        Ok(())
    }

    async fn toggle_star(&self, id: &NoteId) -> Result<Note> {
        self.enter("toggle_star").await?;
        let mut s = self.lock();
        let at = s.now();
        let note = s
            .notes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| missing("note", id))?;
        note.is_starred = !note.is_starred;
        note.updated_at = Some(at);
        Ok(note.clone())
    }

    async fn search_notes(&self, query: &str) -> Result<Vec<Note>> {
        self.enter("search_notes").await?;
        let s = self.lock();
        Ok(match s.search_results {
            Some(ref fixed) => fixed.clone(),
            None => local_matches(&s.notes, query),
        })
    }
}

#[async_trait]
impl ReminderBackend for MemoryBackend {
    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        self.enter_authenticated("list_reminders").await?;
        Ok(self.reminders())
    }

    async fn get_reminder(&self, id: &ReminderId) -> Result<Reminder> {
        self.enter_authenticated("get_reminder").await?;
        self.lock()
            .reminders
            .iter()
            .find(|r| &r.id == id)
            .cloned()
            .ok_or_else(|| missing("reminder", id))
    }

    async fn create_reminder(&self, payload: &ReminderPayload) -> Result<Reminder> {
        self.enter_authenticated("create_reminder").await?;
        let mut s = self.lock();
        let id = s.next_id();
        let note_id = payload.note.note_id.clone();
        let reminder = Reminder {
            id,
            note_title: s.notes.iter().find(|n| n.id == note_id).map(|n| n.title.clone()),
            note_id: Some(note_id),
            message: payload.message.clone(),
            reminder_time: payload.reminder_time,
            is_sent: payload.is_sent,
        };
        s.reminders.push(reminder.clone());
        Ok(reminder)
    }

    async fn update_reminder(&self, id: &ReminderId, payload: &ReminderPayload) -> Result<Reminder> {
        self.enter_authenticated("update_reminder").await?;
        let mut s = self.lock();
        let reminder = s
            .reminders
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| missing("reminder", id))?;
        reminder.note_id = Some(payload.note.note_id.clone());
        reminder.message = payload.message.clone();
        reminder.reminder_time = payload.reminder_time;
        reminder.is_sent = payload.is_sent;
        Ok(reminder.clone())
    }

    async fn delete_reminder(&self, id: &ReminderId) -> Result<()> {
        self.enter_authenticated("delete_reminder").await?;
        let mut s = self.lock();
        let before = s.reminders.len();
        s.reminders.retain(|r| &r.id != id);
        if s.reminders.len() == before {
            return Err(missing("reminder", id));
        }
        Ok(())
    }

    async fn pending_reminders(&self) -> Result<Vec<Reminder>> {
        self.enter_authenticated("pending_reminders").await?;
        let now = Utc::now();
        Ok(self
            .lock()
            .reminders
            .iter()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: &ReminderId) -> Result<()> {
        self.enter_authenticated("mark_sent").await?;
        let mut s = self.lock();
        let reminder = s
            .reminders
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| missing("reminder", id))?;
        reminder.is_sent = true;
        Ok(())
    }
}

/// Sink that keeps everything it is shown.
#[derive(Default)]
pub struct RecordingSink {
    toasts: Mutex<Vec<Toast>>,
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn toast(&self, toast: &Toast) {
        self.toasts.lock().unwrap().push(toast.clone());
    }

    fn notify(&self, notification: &Notification) {
        self.notifications.lock().unwrap().push(notification.clone());
    }
}
