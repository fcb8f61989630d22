//! Reminder store and status grouping.
//!
//! Same confirmed-only contract as the note store: the backend answers
//! first, local state follows. Status is never stored; it is derived from
//! `(is_sent, reminder_time, now)` each time a view asks.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backend::ReminderBackend;
use crate::error::Result;
use crate::models::{NoteId, Reminder, ReminderDraft, ReminderId, ReminderStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReminderGroups {
    pub pending: Vec<Reminder>,
    pub overdue: Vec<Reminder>,
    pub completed: Vec<Reminder>,
}

impl ReminderGroups {
    pub fn get(&self, status: ReminderStatus) -> &[Reminder] {
        match status {
            ReminderStatus::Pending => &self.pending,
            ReminderStatus::Overdue => &self.overdue,
            ReminderStatus::Completed => &self.completed,
        }
    }

    /// Non-empty groups in display order.
    pub fn iter(&self) -> impl Iterator<Item = (ReminderStatus, &[Reminder])> {
        [
            ReminderStatus::Overdue,
            ReminderStatus::Pending,
            ReminderStatus::Completed,
        ]
        .into_iter()
        .map(move |s| (s, self.get(s)))
        .filter(|(_, group)| !group.is_empty())
    }
}

/// Split `reminders` by status at `now`, keeping input order within groups.
pub fn group_by_status(reminders: &[Reminder], now: DateTime<Utc>) -> ReminderGroups {
    let mut groups = ReminderGroups::default();
    for reminder in reminders {
        let bucket = match reminder.status(now) {
            ReminderStatus::Pending => &mut groups.pending,
            ReminderStatus::Overdue => &mut groups.overdue,
            ReminderStatus::Completed => &mut groups.completed,
        };
        bucket.push(reminder.clone());
    }
    groups
}

pub struct ReminderStore<B: ?Sized> {
    backend: Arc<B>,
    reminders: Vec<Reminder>,
    pending: Vec<Reminder>,
}

impl<B: ReminderBackend + ?Sized> ReminderStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            reminders: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn reminders(&self) -> &[Reminder] {
        &self.reminders
    }

    /// Last fetched `/pending` list (due and unsent).
    pub fn pending(&self) -> &[Reminder] {
        &self.pending
    }

    pub fn get(&self, id: &ReminderId) -> Option<&Reminder> {
        self.reminders.iter().find(|r| &r.id == id)
    }

    pub fn for_note(&self, note_id: &NoteId) -> Vec<&Reminder> {
        self.reminders
            .iter()
            .filter(|r| r.note_id.as_ref() == Some(note_id))
            .collect()
    }

    /// Recomputed on every call from current data and `now`.
    pub fn partition(&self, now: DateTime<Utc>) -> ReminderGroups {
        group_by_status(&self.reminders, now)
    }

    // ========================================================================
    // Backend round-trips
    // ========================================================================

    pub async fn load(&mut self) -> Result<()> {
        self.reminders = self.backend.list_reminders().await?;
        tracing::info!(count = self.reminders.len(), "reminders loaded");
        Ok(())
    }

    pub async fn load_pending(&mut self) -> Result<&[Reminder]> {
        self.pending = self.backend.pending_reminders().await?;
        Ok(&self.pending)
    }

    pub async fn fetch(&mut self, id: &ReminderId) -> Result<Reminder> {
        let reminder = self.backend.get_reminder(id).await?;
        if !self.apply_updated(reminder.clone()) {
            self.reminders.push(reminder.clone());
        }
        Ok(reminder)
    }

    /// `note_title` feeds the default message when the draft has none.
    pub async fn create(&mut self, draft: &ReminderDraft, note_title: Option<&str>) -> Result<Reminder> {
        let reminder = self.backend.create_reminder(&draft.to_payload(note_title)).await?;
        self.apply_created(reminder.clone());
        Ok(reminder)
    }

    pub async fn update(
        &mut self,
        id: &ReminderId,
        draft: &ReminderDraft,
        note_title: Option<&str>,
    ) -> Result<Reminder> {
        let reminder = self
            .backend
            .update_reminder(id, &draft.to_payload(note_title))
            .await?;
        self.apply_updated(reminder.clone());
        Ok(reminder)
    }

    pub async fn delete(&mut self, id: &ReminderId) -> Result<()> {
        self.backend.delete_reminder(id).await?;
        self.apply_deleted(id);
        Ok(())
    }

    pub async fn mark_sent(&mut self, id: &ReminderId) -> Result<()> {
        self.backend.mark_sent(id).await?;
        self.apply_sent(id);
        Ok(())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    pub fn apply_created(&mut self, reminder: Reminder) {
        tracing::info!(id = %reminder.id, at = %reminder.reminder_time, "reminder created");
        self.reminders.retain(|r| r.id != reminder.id);
        self.reminders.push(reminder);
    }

    pub fn apply_updated(&mut self, reminder: Reminder) -> bool {
        self.pending.retain(|r| r.id != reminder.id || !reminder.is_sent);
        match self.reminders.iter_mut().find(|r| r.id == reminder.id) {
            Some(slot) => {
                *slot = reminder;
                true
            }
            None => false,
        }
    }

    pub fn apply_deleted(&mut self, id: &ReminderId) -> bool {
        let before = self.reminders.len();
        self.reminders.retain(|r| &r.id != id);
        self.pending.retain(|r| &r.id != id);
        before != self.reminders.len()
    }

    pub fn apply_sent(&mut self, id: &ReminderId) {
        if let Some(r) = self.reminders.iter_mut().find(|r| &r.id == id) {
            r.is_sent = true;
        }
        self.pending.retain(|r| &r.id != id);
        tracing::info!(id = %id, "reminder marked sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::models::EntityId;
    use crate::testing::MemoryBackend;
    use chrono::Duration;

    fn reminder(id: i64, offset_hours: i64, sent: bool, now: DateTime<Utc>) -> Reminder {
        Reminder {
            id: EntityId::Int(id),
            note_id: Some(EntityId::Int(1)),
            note_title: None,
            message: format!("r{}", id),
            reminder_time: now + Duration::hours(offset_hours),
            is_sent: sent,
        }
    }

    #[test]
    fn test_grouping_follows_status_rules() {
        let now = Utc::now();
        let all = vec![
            reminder(1, -1, false, now),
            reminder(2, -1, true, now),
            reminder(3, 1, false, now),
            reminder(4, 5, true, now),
        ];
        let groups = group_by_status(&all, now);
        assert_eq!(groups.overdue.len(), 1);
        assert_eq!(groups.overdue[0].id, EntityId::Int(1));
        assert_eq!(groups.pending[0].id, EntityId::Int(3));
        assert_eq!(groups.completed.len(), 2);

        let order: Vec<_> = groups.iter().map(|(s, g)| (s, g.len())).collect();
        assert_eq!(
            order,
            vec![
                (ReminderStatus::Overdue, 1),
                (ReminderStatus::Pending, 1),
                (ReminderStatus::Completed, 2)
            ]
        );
    }

    #[test]
    fn test_partition_depends_on_clock() {
        let now = Utc::now();
        let mut store = ReminderStore::new(Arc::new(MemoryBackend::new()));
        store.apply_created(reminder(1, 1, false, now));
        assert_eq!(store.partition(now).pending.len(), 1);
        assert_eq!(store.partition(now + Duration::hours(2)).overdue.len(), 1);
    }

    fn draft(hours: i64) -> ReminderDraft {
        ReminderDraft {
            note_id: EntityId::Int(1),
            message: String::new(),
            reminder_time: Utc::now() + Duration::hours(hours),
        }
    }

    #[tokio::test]
    async fn test_create_requires_backend_confirmation() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = ReminderStore::new(Arc::clone(&backend));

        backend.fail("create_reminder");
        assert!(store.create(&draft(1), Some("Taxes")).await.is_err());
        assert!(store.reminders().is_empty());

        backend.recover("create_reminder");
        let created = store.create(&draft(1), Some("Taxes")).await.unwrap();
        assert_eq!(created.message, "Reminder for: Taxes");
        assert_eq!(store.reminders().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_sent_completes_and_leaves_pending() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = ReminderStore::new(Arc::clone(&backend));
        let r = store.create(&draft(-1), None).await.unwrap();
        store.load_pending().await.unwrap();
        assert_eq!(store.pending().len(), 1);

        store.mark_sent(&r.id).await.unwrap();
        assert!(store.pending().is_empty());
        assert_eq!(
            store.get(&r.id).unwrap().status(Utc::now()),
            ReminderStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = ReminderStore::new(Arc::clone(&backend));
        let r = store.create(&draft(1), None).await.unwrap();

        let mut changed = draft(3);
        changed.message = "call back".into();
        let updated = store.update(&r.id, &changed, None).await.unwrap();
        assert_eq!(updated.message, "call back");
        assert_eq!(store.get(&r.id).unwrap().message, "call back");
        assert_eq!(store.for_note(&EntityId::Int(1)).len(), 1);

        store.delete(&r.id).await.unwrap();
        assert!(store.reminders().is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_backend_is_refused() {
        let backend = Arc::new(MemoryBackend::signed_out());
        let mut store = ReminderStore::new(backend);
        assert!(matches!(
            store.load().await,
            Err(ClientError::NotAuthenticated)
        ));
    }
}
