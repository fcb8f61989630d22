//! The signed-in workspace.
//!
//! Ties the stores, the editor, the graph view, search and notifications
//! together the way the UI shell does: edits flow from the editor into the
//! note store, confirmed changes rebuild the graph, and every user-facing
//! CRUD outcome becomes a toast.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{NoteBackend, ReminderBackend};
use crate::config::ClientConfig;
use crate::debounce::Debounce;
use crate::editor::{EditorSession, SaveOutcome, SaveTarget, SaveTrigger};
use crate::error::Result;
use crate::graph::{GraphView, Viewport};
use crate::layout::Point;
use crate::models::{Note, NoteDraft, NoteId, NotePatch, Reminder, ReminderDraft, ReminderId};
use crate::note_store::NoteStore;
use crate::notify::{Notification, NotificationCenter, NotificationSink, ReminderPoller, Toast};
use crate::reminders::ReminderStore;
use crate::search::{SearchResults, SearchSession};

pub struct Workspace<B: ?Sized> {
    backend: Arc<B>,
    notes: NoteStore<B>,
    reminders: ReminderStore<B>,
    editor: EditorSession,
    graph: GraphView,
    search: SearchSession,
    notifications: Arc<Mutex<NotificationCenter>>,
    sink: Arc<dyn NotificationSink>,
    poll_interval: Duration,
}

impl<B> Workspace<B>
where
    B: NoteBackend + ReminderBackend + ?Sized + 'static,
{
    pub fn new(backend: Arc<B>, config: &ClientConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            notes: NoteStore::new(Arc::clone(&backend)),
            reminders: ReminderStore::new(Arc::clone(&backend)),
            backend,
            editor: EditorSession::new(config.auto_save_delay),
            graph: GraphView::new(Viewport::default()),
            search: SearchSession::new(Debounce::new(config.search_debounce)),
            notifications: Arc::new(Mutex::new(NotificationCenter::new(config.snooze))),
            sink,
            poll_interval: config.reminder_poll_interval,
        }
    }

    pub fn notes(&self) -> &NoteStore<B> {
        &self.notes
    }

    pub fn reminders(&self) -> &ReminderStore<B> {
        &self.reminders
    }

    pub fn editor(&self) -> &EditorSession {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut EditorSession {
        &mut self.editor
    }

    pub fn graph(&self) -> &GraphView {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphView {
        &mut self.graph
    }

    pub fn notifications(&self) -> &Arc<Mutex<NotificationCenter>> {
        &self.notifications
    }

    fn toast(&self, toast: Toast) {
        self.sink.toast(&toast);
    }

    fn refresh_graph(&mut self) {
        self.graph.update(self.notes.notes());
        self.graph.set_selected(self.notes.selected_id().cloned());
    }

    // ========================================================================
    // Loading and selection
    // ========================================================================

    /// Load notes and reminders concurrently. A reminder failure (for example
    /// no token) is logged; the note list still loads.
    pub async fn load(&mut self) -> Result<()> {
        let (notes, reminders) = futures_util::join!(self.notes.load(), self.reminders.load());
        if let Err(err) = notes {
            self.toast(Toast::error(err.user_message()));
            return Err(err);
        }
        if let Err(err) = reminders {
            warn!(error = %err, "could not load reminders");
        }
        self.refresh_graph();
        Ok(())
    }

    /// Switch the editor to `id`, dropping any pending auto-save of the
    /// previous note.
    pub fn select_note(&mut self, id: Option<&NoteId>) -> bool {
        if !self.notes.select(id) {
            return false;
        }
        self.editor.open(self.notes.selected());
        self.graph.set_selected(self.notes.selected_id().cloned());
        true
    }

    /// Start a blank draft; it is created on first save.
    pub fn new_note(&mut self) {
        self.notes.select(None);
        self.editor.open(None);
        self.graph.set_selected(None);
    }

    /// Forward a graph click to the selection.
    pub fn click_graph(&mut self, screen: Point) -> Option<Note> {
        let note = self.graph.click(screen)?;
        self.select_note(Some(&note.id));
        Some(note)
    }

    // ========================================================================
    // Editor saves
    // ========================================================================

    /// Save the editor buffer. `None` when there was nothing to save.
    pub async fn save(&mut self, trigger: SaveTrigger) -> Option<SaveOutcome> {
        let request = self.editor.begin_save(trigger)?;
        let result = match request.target {
            SaveTarget::Create => self.backend.create_note(&request.patch.apply_to(None)).await,
            SaveTarget::Update(ref id) => {
                let payload = request.patch.apply_to(self.notes.get(id));
                self.backend.update_note(id, &payload).await
            }
        };
        let outcome = self.editor.finish_save(&request, result.as_ref());

        match result {
            Ok(note) => {
                match request.target {
                    SaveTarget::Create => {
                        let current = outcome != SaveOutcome::Stale;
                        self.notes.apply_created(note, current);
                        self.reload_reminders().await;
                    }
                    SaveTarget::Update(_) => {
                        self.notes.apply_updated(note);
                    }
                }
                self.refresh_graph();
                if trigger == SaveTrigger::Manual {
                    self.toast(Toast::success("Note saved"));
                }
            }
            Err(err) => match trigger {
                SaveTrigger::Manual => self.toast(Toast::error(err.user_message())),
                SaveTrigger::Auto => warn!(error = %err, "auto-save failed"),
            },
        }
        debug!(?outcome, "save finished");
        Some(outcome)
    }

    /// Wait out the editor's idle window, then auto-save. Never resolves while
    /// no edit is pending.
    pub async fn wait_for_autosave(&mut self) -> Option<SaveOutcome> {
        self.editor.autosave_fired().await;
        self.save(SaveTrigger::Auto).await
    }

    // ========================================================================
    // Note CRUD
    // ========================================================================

    pub async fn create_note(&mut self, draft: &NoteDraft) -> Result<Note> {
        match self.notes.create(draft).await {
            Ok(note) => {
                self.editor.open(Some(&note));
                self.refresh_graph();
                self.reload_reminders().await;
                self.toast(Toast::success("Note created"));
                Ok(note)
            }
            Err(err) => {
                self.toast(Toast::error(err.user_message()));
                Err(err)
            }
        }
    }

    pub async fn update_note(&mut self, id: &NoteId, patch: &NotePatch) -> Result<Note> {
        match self.notes.update(id, patch).await {
            Ok(note) => {
                if self.editor.note_id() == Some(id) && !self.editor.is_dirty() {
                    self.editor.open(Some(&note));
                }
                self.refresh_graph();
                self.toast(Toast::success("Note updated"));
                Ok(note)
            }
            Err(err) => {
                self.toast(Toast::error(err.user_message()));
                Err(err)
            }
        }
    }

    pub async fn delete_note(&mut self, id: &NoteId) -> Result<()> {
        match self.notes.delete(id).await {
            Ok(()) => {
                if self.editor.note_id() == Some(id) {
                    self.editor.open(None);
                }
                self.refresh_graph();
                self.toast(Toast::success("Note deleted"));
                Ok(())
            }
            Err(err) => {
                self.toast(Toast::error(err.user_message()));
                Err(err)
            }
        }
    }

    pub async fn toggle_star(&mut self, id: &NoteId) -> Result<Note> {
        match self.notes.toggle_star(id).await {
            Ok(note) => {
                self.refresh_graph();
                Ok(note)
            }
            Err(err) => {
                self.toast(Toast::error(err.user_message()));
                Err(err)
            }
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Immediate search with no debounce.
    pub async fn search(&self, query: &str) -> Vec<Note> {
        crate::search::search(self.backend.as_ref(), query, self.notes.notes()).await
    }

    pub fn search_input(&mut self, query: impl Into<String>) {
        self.search.input(query);
    }

    /// Wait for typing to pause, then run the latest query.
    pub async fn run_search(&mut self) -> &SearchResults {
        self.search.run(self.backend.as_ref(), self.notes.notes()).await
    }

    pub fn search_results_mut(&mut self) -> &mut SearchResults {
        self.search.results_mut()
    }

    // ========================================================================
    // Reminders and notifications
    // ========================================================================

    /// Refresh the reminder list after note changes; failures are only logged.
    async fn reload_reminders(&mut self) {
        if let Err(err) = self.reminders.load().await {
            warn!(error = %err, "could not reload reminders");
        }
    }

    pub async fn create_reminder(
        &mut self,
        note_id: &NoteId,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<Reminder> {
        let draft = ReminderDraft {
            note_id: note_id.clone(),
            message: message.to_string(),
            reminder_time: at,
        };
        let title = self.notes.get(note_id).map(|n| n.display_title().to_string());
        match self.reminders.create(&draft, title.as_deref()).await {
            Ok(reminder) => {
                self.toast(Toast::success("Reminder created"));
                Ok(reminder)
            }
            Err(err) => {
                self.toast(Toast::error(err.user_message()));
                Err(err)
            }
        }
    }

    pub async fn delete_reminder(&mut self, id: &ReminderId) -> Result<()> {
        match self.reminders.delete(id).await {
            Ok(()) => {
                self.notifications.lock().await.acknowledge(id);
                self.toast(Toast::success("Reminder deleted"));
                Ok(())
            }
            Err(err) => {
                self.toast(Toast::error(err.user_message()));
                Err(err)
            }
        }
    }

    /// Mark a reminder as read: mark-sent on the backend, then forget it locally.
    pub async fn mark_read(&mut self, id: &ReminderId) -> Result<()> {
        match self.reminders.mark_sent(id).await {
            Ok(()) => {
                self.notifications.lock().await.acknowledge(id);
                self.toast(Toast::success("Reminder marked as completed"));
                Ok(())
            }
            Err(err) => {
                self.toast(Toast::error("Failed to mark reminder as completed"));
                Err(err)
            }
        }
    }

    pub async fn snooze(&mut self, id: &ReminderId) -> DateTime<Utc> {
        let until = self.notifications.lock().await.snooze(id, Utc::now());
        self.toast(Toast::success("Reminder snoozed for 15 minutes"));
        until
    }

    /// Check the pending list right now and announce what is due.
    pub async fn check_reminders(&mut self) -> Result<Vec<Notification>> {
        let pending = match self.reminders.load_pending().await {
            Ok(pending) => pending.to_vec(),
            Err(err) => {
                self.toast(Toast::error("Failed to check pending reminders"));
                return Err(err);
            }
        };
        self.toast(Toast::info(format!("Found {} pending reminders", pending.len())));
        let fresh = self.notifications.lock().await.announce_due(&pending, Utc::now());
        for notification in &fresh {
            self.sink.notify(notification);
        }
        Ok(fresh)
    }

    pub async fn test_notification(&self) -> Notification {
        let notification = self.notifications.lock().await.test_notification(Utc::now());
        self.sink.notify(&notification);
        notification
    }

    /// Background polling of `/api/reminders/pending` at the configured interval.
    pub fn start_polling(&self) -> JoinHandle<()> {
        ReminderPoller::new(Arc::clone(&self.backend), self.poll_interval)
            .spawn(Arc::clone(&self.notifications), Arc::clone(&self.sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditorStatus;
    use crate::graph::GraphFrame;
    use crate::notify::ToastLevel;
    use crate::testing::{MemoryBackend, RecordingSink};

    async fn workspace(
        titles: &[(&str, &str)],
    ) -> (Arc<MemoryBackend>, Arc<RecordingSink>, Workspace<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        for (title, content) in titles {
            backend.insert_note(title, content);
        }
        let sink = Arc::new(RecordingSink::default());
        let mut ws = Workspace::new(Arc::clone(&backend), &ClientConfig::default(), sink.clone());
        ws.load().await.unwrap();
        (backend, sink, ws)
    }

    #[tokio::test]
    async fn test_unresolved_link_leaves_isolated_node() {
        let (_, _, mut ws) = workspace(&[]).await;
        ws.new_note();
        ws.editor_mut().set_title("Test");
        assert_eq!(ws.save(SaveTrigger::Manual).await, Some(SaveOutcome::Saved));
        assert_eq!(ws.notes().len(), 1);

        ws.editor_mut().set_content("[[Nonexistent]]");
        assert_eq!(ws.save(SaveTrigger::Manual).await, Some(SaveOutcome::Saved));
        assert_eq!(ws.notes().notes()[0].content, "[[Nonexistent]]");

        let graph = ws.graph().graph();
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
        assert_eq!(graph.nodes[0].link_count, 0);
    }

    #[tokio::test]
    async fn test_saved_link_adds_edge() {
        let (_, sink, mut ws) = workspace(&[("Rust", "")]).await;
        ws.new_note();
        ws.editor_mut().set_title("Notes");
        ws.editor_mut().set_content("see [[rust]]");
        ws.save(SaveTrigger::Manual).await;

        assert_eq!(ws.graph().graph().edges.len(), 1);
        assert_eq!(ws.notes().selected().unwrap().title, "Notes");
        assert!(matches!(ws.graph().frame(), GraphFrame::Ready { .. }));
        assert_eq!(sink.toasts().last().unwrap(), &Toast::success("Note saved"));
    }

    #[tokio::test]
    async fn test_blank_save_is_noop() {
        let (backend, _, mut ws) = workspace(&[]).await;
        ws.new_note();
        ws.editor_mut().set_title("  ");
        assert_eq!(ws.save(SaveTrigger::Manual).await, None);
        assert_eq!(backend.calls("create_note"), 0);
        assert!(matches!(ws.graph().frame(), GraphFrame::Empty));
    }

    #[tokio::test]
    async fn test_manual_save_failure_toasts_and_stays_dirty() {
        let (backend, sink, mut ws) = workspace(&[("A", "")]).await;
        let id = ws.notes().notes()[0].id.clone();
        ws.select_note(Some(&id));
        ws.editor_mut().set_content("new");
        backend.fail("update_note");

        let outcome = ws.save(SaveTrigger::Manual).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Failed(_)));
        assert_eq!(ws.editor().status(), EditorStatus::Dirty);
        assert_eq!(sink.toasts().last().unwrap().level, ToastLevel::Error);
        assert_eq!(ws.notes().get(&id).unwrap().content, "");
    }

    #[tokio::test]
    async fn test_auto_save_failure_is_quiet() {
        let (backend, sink, mut ws) = workspace(&[("A", "")]).await;
        let id = ws.notes().notes()[0].id.clone();
        ws.select_note(Some(&id));
        ws.editor_mut().set_content("new");
        backend.fail("update_note");
        ws.save(SaveTrigger::Auto).await;
        assert!(sink.toasts().is_empty());
        assert!(ws.editor().last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_fires_once_after_last_edit() {
        let (backend, _, mut ws) = workspace(&[("A", "")]).await;
        let id = ws.notes().notes()[0].id.clone();
        ws.select_note(Some(&id));

        let start = tokio::time::Instant::now();
        ws.editor_mut().set_content("a");
        tokio::time::advance(Duration::from_millis(1900)).await;
        ws.editor_mut().set_content("ab");

        let outcome = ws.wait_for_autosave().await;
        let elapsed = start.elapsed();
        assert_eq!(outcome, Some(SaveOutcome::Saved));
        assert!(elapsed >= Duration::from_millis(3900) && elapsed < Duration::from_millis(3910));
        assert_eq!(backend.calls("update_note"), 1);
        assert_eq!(backend.note(&id).unwrap().content, "ab");
        assert!(!ws.editor().autosave_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_notes_drops_pending_auto_save() {
        let (backend, _, mut ws) = workspace(&[("A", ""), ("B", "")]).await;
        let a = ws.notes().notes()[0].id.clone();
        let b = ws.notes().notes()[1].id.clone();
        ws.select_note(Some(&a));
        ws.editor_mut().set_content("draft");
        ws.select_note(Some(&b));
        assert!(!ws.editor().autosave_pending());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(backend.calls("update_note"), 0);
        assert_eq!(ws.editor().content(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_saves_apply_in_arrival_order() {
        let (backend, _, mut ws) = workspace(&[("A", ""), ("B", "")]).await;
        let a = ws.notes().notes()[0].id.clone();
        let b = ws.notes().notes()[1].id.clone();
        ws.select_note(Some(&a));
        backend.delay("update_note", Duration::from_millis(300));

        ws.editor_mut().set_content("first");
        let first = ws.editor_mut().begin_save(SaveTrigger::Auto).unwrap();
        ws.editor_mut().set_content("second");
        let second = ws.editor_mut().begin_save(SaveTrigger::Manual).unwrap();
        let first_payload = first.patch.apply_to(ws.notes().get(&a));
        let second_payload = second.patch.apply_to(ws.notes().get(&a));

        // The first request is held up and lands after the second.
        let start = tokio::time::Instant::now();
        let (slow, fast) = futures_util::join!(
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let result = backend.update_note(&a, &first_payload).await;
                (&first, result, start.elapsed())
            },
            async {
                let result = backend.update_note(&a, &second_payload).await;
                (&second, result, start.elapsed())
            }
        );
        assert!(fast.2 >= Duration::from_millis(300) && fast.2 < Duration::from_millis(310));
        assert!(slow.2 >= Duration::from_millis(800) && slow.2 < Duration::from_millis(810));

        let mut outcomes = Vec::new();
        for (request, result, _) in [fast, slow] {
            outcomes.push(ws.editor_mut().finish_save(request, result.as_ref()));
            ws.notes.apply_updated(result.unwrap());
        }
        assert_eq!(outcomes, vec![SaveOutcome::Saved, SaveOutcome::SavedWithPendingEdits]);
        assert_eq!(ws.notes().get(&a).unwrap().content, "first");
        assert_eq!(backend.note(&a).unwrap().content, "first");

        // A response that lands after switching notes leaves the editor alone.
        ws.editor_mut().set_content("third");
        let third = ws.editor_mut().begin_save(SaveTrigger::Auto).unwrap();
        let third_payload = third.patch.apply_to(ws.notes().get(&a));
        let (result, switched) = futures_util::join!(backend.update_note(&a, &third_payload), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            ws.select_note(Some(&b))
        });
        assert!(switched);
        assert_eq!(ws.editor_mut().finish_save(&third, result.as_ref()), SaveOutcome::Stale);
        assert_eq!(ws.editor().note_id(), Some(&b));
        assert_eq!(ws.editor().content(), "");
        assert_eq!(ws.editor().status(), EditorStatus::Clean);
    }

    #[tokio::test]
    async fn test_delete_selected_note_resets_editor() {
        let (_, _, mut ws) = workspace(&[("X", "x"), ("Y", "y")]).await;
        let x = ws.notes().notes()[0].id.clone();
        ws.select_note(Some(&x));
        ws.delete_note(&x).await.unwrap();
        assert!(ws.notes().selected_id().is_none());
        assert!(ws.editor().note_id().is_none());
        assert_eq!(ws.graph().graph().nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_other_note_keeps_editor() {
        let (_, _, mut ws) = workspace(&[("X", "x"), ("Y", "y")]).await;
        let x = ws.notes().notes()[0].id.clone();
        let y = ws.notes().notes()[1].id.clone();
        ws.select_note(Some(&x));
        ws.delete_note(&y).await.unwrap();
        assert_eq!(ws.notes().selected_id(), Some(&x));
        assert_eq!(ws.editor().note_id(), Some(&x));
    }

    #[tokio::test]
    async fn test_load_without_token_still_lists_notes() {
        let backend = Arc::new(MemoryBackend::signed_out());
        backend.insert_note("A", "");
        let mut ws = Workspace::new(
            Arc::clone(&backend),
            &ClientConfig::default(),
            Arc::new(RecordingSink::default()),
        );
        ws.load().await.unwrap();
        assert_eq!(ws.notes().len(), 1);
        assert!(ws.reminders().reminders().is_empty());
    }

    #[tokio::test]
    async fn test_due_reminder_is_announced_and_marked_read() {
        let (backend, sink, mut ws) = workspace(&[("Taxes", "")]).await;
        let id = ws.notes().notes()[0].id.clone();
        let reminder = ws
            .create_reminder(&id, "", Utc::now() - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(reminder.message, "Reminder for: Taxes");

        let fresh = ws.check_reminders().await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(sink.notifications().len(), 1);
        assert!(ws.check_reminders().await.unwrap().is_empty());

        ws.mark_read(&reminder.id).await.unwrap();
        assert!(backend.reminders()[0].is_sent);
        assert!(ws.check_reminders().await.unwrap().is_empty());
        assert_eq!(
            sink.toasts().last().unwrap(),
            &Toast::info("Found 0 pending reminders")
        );
    }

    #[tokio::test]
    async fn test_search_ranks_title_hits_first() {
        let (_, _, ws) = workspace(&[("Other", "about rust"), ("Rust book", "")]).await;
        let found = ws.search("rust").await;
        let titles: Vec<_> = found.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust book", "Other"]);
    }
}
