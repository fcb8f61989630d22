//! Notification channel.
//!
//! Due reminders reach the user either as pushed events or by polling
//! `/api/reminders/pending`. Both paths end in the [`NotificationCenter`],
//! which keeps a bounded history, suppresses snoozed reminders and fans
//! notifications out to subscribers over a broadcast channel. Toasts are
//! the short-lived messages that follow CRUD operations; a host decides how
//! to show them through a [`NotificationSink`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::ReminderBackend;
use crate::error::Result;
use crate::models::{EntityId, Reminder, ReminderId};

pub const HISTORY_LIMIT: usize = 50;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Reminder,
    Test,
    #[serde(other)]
    Info,
}

/// Pushed event shape: `{id, type, title, message, noteTitle?, reminderTime?, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub note_title: Option<String>,
    /// Display string; pushed events carry whatever the server formatted.
    #[serde(default)]
    pub reminder_time: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl Notification {
    pub fn heading(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => match self.kind {
                NotificationKind::Reminder => "Reminder",
                _ => "Notification",
            },
        }
    }

    pub fn is_reminder(&self) -> bool {
        self.kind == NotificationKind::Reminder
    }
}

pub fn parse_push_event(raw: &str) -> Result<Notification> {
    Ok(serde_json::from_str(raw)?)
}

/// Notification for a reminder found due at `now`.
pub fn reminder_notification(reminder: &Reminder, now: DateTime<Utc>) -> Notification {
    Notification {
        id: reminder.id.clone(),
        kind: NotificationKind::Reminder,
        title: Some("Reminder Due".to_string()),
        message: reminder.message.clone(),
        note_title: reminder.note_title.clone(),
        reminder_time: Some(reminder.reminder_time.to_rfc3339()),
        timestamp: now.timestamp_millis(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Where toasts and notifications are displayed.
pub trait NotificationSink: Send + Sync {
    fn toast(&self, toast: &Toast);
    fn notify(&self, notification: &Notification);
}

/// Sink that writes everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn toast(&self, toast: &Toast) {
        match toast.level {
            ToastLevel::Error => warn!(message = %toast.message, "toast"),
            _ => info!(message = %toast.message, "toast"),
        }
    }

    fn notify(&self, notification: &Notification) {
        info!(
            id = %notification.id,
            title = notification.heading(),
            message = %notification.message,
            "notification"
        );
    }
}

// ============================================================================
// Notification Center
// ============================================================================

pub struct NotificationCenter {
    history: VecDeque<Notification>,
    announced: HashSet<ReminderId>,
    snoozed_until: HashMap<ReminderId, DateTime<Utc>>,
    snooze: chrono::Duration,
    tx: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new(snooze: Duration) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            announced: HashSet::new(),
            snoozed_until: HashMap::new(),
            snooze: chrono::Duration::from_std(snooze).unwrap_or_else(|_| chrono::Duration::minutes(15)),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Newest first, at most [`HISTORY_LIMIT`] entries.
    pub fn history(&self) -> impl Iterator<Item = &Notification> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Record a notification and hand it to subscribers.
    pub fn push(&mut self, notification: Notification) {
        debug!(id = %notification.id, kind = ?notification.kind, "notification received");
        self.history.push_front(notification.clone());
        self.history.truncate(HISTORY_LIMIT);
        // No receivers is fine.
        let _ = self.tx.send(notification);
    }

    /// Announce every due reminder in `pending` that is neither snoozed nor
    /// already announced. Returns the new notifications. Reminders missing
    /// from `pending` are forgotten, so one that comes back is announced again.
    pub fn announce_due(&mut self, pending: &[Reminder], now: DateTime<Utc>) -> Vec<Notification> {
        self.snoozed_until.retain(|_, until| *until > now);
        self.announced.retain(|id| pending.iter().any(|r| &r.id == id));
        let fresh: Vec<Notification> = pending
            .iter()
            .filter(|r| r.is_due(now))
            .filter(|r| !self.snoozed_until.contains_key(&r.id) && !self.announced.contains(&r.id))
            .map(|r| reminder_notification(r, now))
            .collect();
        for notification in &fresh {
            self.announced.insert(notification.id.clone());
            self.push(notification.clone());
        }
        fresh
    }

    /// Hide a reminder until the snooze window passes; it is announced again afterwards.
    pub fn snooze(&mut self, id: &ReminderId, now: DateTime<Utc>) -> DateTime<Utc> {
        let until = now + self.snooze;
        self.announced.remove(id);
        self.snoozed_until.insert(id.clone(), until);
        info!(id = %id, until = %until, "reminder snoozed");
        until
    }

    pub fn is_snoozed(&self, id: &ReminderId, now: DateTime<Utc>) -> bool {
        self.snoozed_until.get(id).is_some_and(|until| *until > now)
    }

    /// Forget a reminder once it is marked read on the backend.
    pub fn acknowledge(&mut self, id: &ReminderId) {
        self.announced.remove(id);
        self.snoozed_until.remove(id);
    }

    pub fn test_notification(&mut self, now: DateTime<Utc>) -> Notification {
        let notification = Notification {
            id: EntityId::Int(now.timestamp_millis()),
            kind: NotificationKind::Test,
            title: Some("Test Notification".to_string()),
            message: "This is a test notification from Kairo!".to_string(),
            note_title: None,
            reminder_time: None,
            timestamp: now.timestamp_millis(),
        };
        self.push(notification.clone());
        notification
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Periodically checks the pending list and announces due reminders.
pub struct ReminderPoller<B: ?Sized> {
    backend: Arc<B>,
    interval: Duration,
}

impl<B: ReminderBackend + ?Sized + 'static> ReminderPoller<B> {
    pub fn new(backend: Arc<B>, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// One check. Failures are logged and yield no notifications.
    pub async fn poll_once(&self, center: &Mutex<NotificationCenter>) -> Vec<Notification> {
        match self.backend.pending_reminders().await {
            Ok(pending) => center.lock().await.announce_due(&pending, Utc::now()),
            Err(err) => {
                warn!(error = %err, "pending reminder check failed");
                Vec::new()
            }
        }
    }

    /// Check now and then once per interval until the task is aborted.
    pub fn spawn(
        self,
        center: Arc<Mutex<NotificationCenter>>,
        sink: Arc<dyn NotificationSink>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for notification in self.poll_once(&center).await {
                    sink.notify(&notification);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryBackend, RecordingSink};
    use chrono::TimeZone;

    fn due(id: i64, now: DateTime<Utc>) -> Reminder {
        Reminder {
            id: EntityId::Int(id),
            note_id: Some(EntityId::Int(1)),
            note_title: Some("Taxes".into()),
            message: "file them".into(),
            reminder_time: now - chrono::Duration::minutes(1),
            is_sent: false,
        }
    }

    fn center() -> NotificationCenter {
        NotificationCenter::new(Duration::from_secs(15 * 60))
    }

    #[test]
    fn test_parse_push_event() {
        let raw = r#"{"id": 7, "type": "reminder", "title": "Reminder Due",
            "message": "call", "noteTitle": "Plans", "timestamp": 1700000000000}"#;
        let n = parse_push_event(raw).unwrap();
        assert_eq!(n.id, EntityId::Int(7));
        assert!(n.is_reminder());
        assert_eq!(n.note_title.as_deref(), Some("Plans"));
        assert!(n.reminder_time.is_none());

        let other = parse_push_event(r#"{"id":"x","type":"digest","message":"m"}"#).unwrap();
        assert_eq!(other.kind, NotificationKind::Info);
        assert_eq!(other.heading(), "Notification");

        assert!(parse_push_event("not json").is_err());
    }

    #[test]
    fn test_history_keeps_last_fifty() {
        let mut c = center();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for i in 0..60 {
            c.push(reminder_notification(&due(i, now), now));
        }
        assert_eq!(c.len(), HISTORY_LIMIT);
        assert_eq!(c.history().next().unwrap().id, EntityId::Int(59));
        assert_eq!(c.history().last().unwrap().id, EntityId::Int(10));
    }

    #[test]
    fn test_announce_due_once() {
        let mut c = center();
        let now = Utc::now();
        let mut later = due(2, now);
        later.reminder_time = now + chrono::Duration::hours(1);
        let pending = vec![due(1, now), later];

        let fresh = c.announce_due(&pending, now);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].title.as_deref(), Some("Reminder Due"));
        assert_eq!(fresh[0].note_title.as_deref(), Some("Taxes"));
        assert!(c.announce_due(&pending, now).is_empty());
    }

    #[test]
    fn test_announced_set_follows_pending_list() {
        let mut c = center();
        let now = Utc::now();
        let pending = vec![due(1, now)];
        assert_eq!(c.announce_due(&pending, now).len(), 1);
        assert!(c.announce_due(&[], now).is_empty());
        assert!(c.announced.is_empty());
        assert_eq!(c.announce_due(&pending, now).len(), 1);
    }

    #[test]
    fn test_snooze_suppresses_for_window() {
        let mut c = center();
        let now = Utc::now();
        let pending = vec![due(1, now)];
        c.announce_due(&pending, now);

        let until = c.snooze(&EntityId::Int(1), now);
        assert_eq!(until - now, chrono::Duration::minutes(15));
        assert!(c.announce_due(&pending, now + chrono::Duration::minutes(10)).is_empty());
        assert!(c.is_snoozed(&EntityId::Int(1), now + chrono::Duration::minutes(14)));

        let after = now + chrono::Duration::minutes(16);
        assert!(!c.is_snoozed(&EntityId::Int(1), after));
        assert_eq!(c.announce_due(&pending, after).len(), 1);
    }

    #[test]
    fn test_acknowledge_allows_reannounce() {
        let mut c = center();
        let now = Utc::now();
        let pending = vec![due(3, now)];
        c.announce_due(&pending, now);
        c.acknowledge(&EntityId::Int(3));
        assert_eq!(c.announce_due(&pending, now).len(), 1);
    }

    #[test]
    fn test_test_notification_is_broadcast() {
        let mut c = center();
        let mut rx = c.subscribe();
        let n = c.test_notification(Utc::now());
        assert_eq!(n.kind, NotificationKind::Test);
        assert_eq!(rx.try_recv().unwrap(), n);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_failure_is_swallowed() {
        let poller = ReminderPoller::new(Arc::new(MemoryBackend::signed_out()), Duration::from_secs(1));
        let c = Mutex::new(center());
        assert!(poller.poll_once(&c).await.is_empty());
        assert!(c.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_poller_delivers_due_reminders() {
        let backend = Arc::new(MemoryBackend::new());
        let note = backend.insert_note("Taxes", "");
        backend.insert_reminder(&note.id, "file them", Utc::now() - chrono::Duration::hours(1));

        let c = Arc::new(Mutex::new(center()));
        let mut rx = c.lock().await.subscribe();
        let sink = Arc::new(RecordingSink::default());
        let handle = ReminderPoller::new(Arc::clone(&backend), Duration::from_secs(300))
            .spawn(Arc::clone(&c), sink.clone());

        let n = rx.recv().await.unwrap();
        assert_eq!(n.message, "file them");
        assert_eq!(n.note_title.as_deref(), Some("Taxes"));

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(backend.calls("pending_reminders"), 2);
        assert_eq!(sink.notifications().len(), 1);
        handle.abort();
    }
}
