//! Data models for the client.
//!
//! This module contains the canonical in-memory shapes for notes, reminders,
//! users and the derived link graph, together with the wire normalization
//! that turns the backend's JSON variants into those shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque backend identifier. The backend may send numbers or strings; the
/// original representation is kept so it can be echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

pub type NoteId = EntityId;
pub type ReminderId = EntityId;

impl EntityId {
    /// Parse user input (CLI arguments, form fields): integers stay integers.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) => EntityId::Int(n),
            Err(_) => EntityId::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{}", n),
            EntityId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Text(s.to_string())
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Tolerant timestamp decoding for backend payloads.
///
/// Accepted forms: RFC 3339, naive ISO local date-time (taken as UTC),
/// epoch milliseconds, and the `[y, m, d, h, min, s, nanos]` array some
/// Java serializers emit.
pub mod timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    fn from_parts(parts: &[Value]) -> Option<DateTime<Utc>> {
        let num = |i: usize| parts.get(i).and_then(Value::as_i64).unwrap_or(0);
        if parts.len() < 3 {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(num(0) as i32, num(1) as u32, num(2) as u32)?;
        let naive = date.and_hms_nano_opt(num(3) as u32, num(4) as u32, num(5) as u32, num(6) as u32)?;
        Some(Utc.from_utc_datetime(&naive))
    }

    pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => parse(s),
            Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Value::Array(parts) => from_parts(parts),
            _ => None,
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => from_value(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp: {}", value))),
        }
    }
}

// ============================================================================
// Notes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "NoteWire")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    /// Markdown; may contain `[[Title]]` wiki-links.
    pub content: String,
    pub is_starred: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Title for display: blank titles render as "Untitled".
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }
}

/// Every note shape the backend is known to send.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteWire {
    id: Option<EntityId>,
    note_id: Option<EntityId>,
    title: Option<String>,
    content: Option<String>,
    is_starred: Option<bool>,
    starred: Option<bool>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<NoteWire> for Note {
    type Error = String;

    fn try_from(wire: NoteWire) -> Result<Self, Self::Error> {
        let id = wire
            .id
            .or(wire.note_id)
            .ok_or_else(|| "note payload has neither `id` nor `noteId`".to_string())?;
        Ok(Note {
            id,
            title: wire.title.unwrap_or_default(),
            content: wire.content.unwrap_or_default(),
            is_starred: wire.is_starred.or(wire.starred).unwrap_or(false),
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        })
    }
}

/// Fields for a note that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub is_starred: bool,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            is_starred: false,
        }
    }

    pub fn to_payload(&self) -> NotePayload {
        NotePayload::new(&self.title, &self.content, self.is_starred)
    }
}

/// Partial update of an existing note. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_starred: Option<bool>,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Full payload for `PUT /api/notes/{id}` built on top of `current`.
    pub fn apply_to(&self, current: Option<&Note>) -> NotePayload {
        let title = self
            .title
            .as_deref()
            .or(current.map(|n| n.title.as_str()))
            .unwrap_or("");
        let content = self
            .content
            .as_deref()
            .or(current.map(|n| n.content.as_str()))
            .unwrap_or("");
        let starred = self
            .is_starred
            .or(current.map(|n| n.is_starred))
            .unwrap_or(false);
        NotePayload::new(title, content, starred)
    }
}

/// Body sent to the backend when creating or updating a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    pub title: String,
    pub content: String,
    pub is_starred: bool,
    pub is_encrypted: bool,
}

impl NotePayload {
    pub fn new(title: &str, content: &str, is_starred: bool) -> Self {
        let title = if title.trim().is_empty() {
            "Untitled".to_string()
        } else {
            title.to_string()
        };
        Self {
            title,
            content: content.to_string(),
            is_starred,
            is_encrypted: false,
        }
    }
}

// ============================================================================
// Reminders
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ReminderWire")]
pub struct Reminder {
    pub id: ReminderId,
    pub note_id: Option<NoteId>,
    pub note_title: Option<String>,
    pub message: String,
    pub reminder_time: DateTime<Utc>,
    pub is_sent: bool,
}

/// Display status of a reminder; a pure function of `(is_sent, reminder_time, now)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Overdue,
    Completed,
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderStatus::Pending => write!(f, "pending"),
            ReminderStatus::Overdue => write!(f, "overdue"),
            ReminderStatus::Completed => write!(f, "completed"),
        }
    }
}

pub fn reminder_status(is_sent: bool, reminder_time: DateTime<Utc>, now: DateTime<Utc>) -> ReminderStatus {
    if is_sent {
        ReminderStatus::Completed
    } else if reminder_time <= now {
        ReminderStatus::Overdue
    } else {
        ReminderStatus::Pending
    }
}

impl Reminder {
    pub fn status(&self, now: DateTime<Utc>) -> ReminderStatus {
        reminder_status(self.is_sent, self.reminder_time, now)
    }

    /// Due means it should be surfaced as a notification right now.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == ReminderStatus::Overdue
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteRefWire {
    id: Option<EntityId>,
    note_id: Option<EntityId>,
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReminderWire {
    id: Option<EntityId>,
    reminder_id: Option<EntityId>,
    note: Option<NoteRefWire>,
    note_id: Option<EntityId>,
    note_title: Option<String>,
    message: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    reminder_time: Option<DateTime<Utc>>,
    is_sent: Option<bool>,
    sent: Option<bool>,
}

impl TryFrom<ReminderWire> for Reminder {
    type Error = String;

    fn try_from(wire: ReminderWire) -> Result<Self, Self::Error> {
        let id = wire
            .id
            .or(wire.reminder_id)
            .ok_or_else(|| "reminder payload has neither `id` nor `reminderId`".to_string())?;
        let reminder_time = wire
            .reminder_time
            .ok_or_else(|| format!("reminder {} has no reminderTime", id))?;
        let (ref_id, ref_title) = match wire.note {
            Some(note) => (note.id.or(note.note_id), note.title),
            None => (None, None),
        };
        Ok(Reminder {
            id,
            note_id: ref_id.or(wire.note_id),
            note_title: ref_title.or(wire.note_title),
            message: wire.message.unwrap_or_default(),
            reminder_time,
            is_sent: wire.is_sent.or(wire.sent).unwrap_or(false),
        })
    }
}

/// Fields for a reminder that does not exist yet (or a full replacement).
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderDraft {
    pub note_id: NoteId,
    pub message: String,
    pub reminder_time: DateTime<Utc>,
}

impl ReminderDraft {
    /// Wire payload. A blank message falls back to one naming the note.
    pub fn to_payload(&self, note_title: Option<&str>) -> ReminderPayload {
        let message = if self.message.trim().is_empty() {
            format!("Reminder for: {}", note_title.unwrap_or("Untitled"))
        } else {
            self.message.clone()
        };
        ReminderPayload {
            note: NoteRef {
                note_id: self.note_id.clone(),
            },
            message,
            reminder_time: self.reminder_time,
            is_sent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRef {
    pub note_id: NoteId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub note: NoteRef,
    pub message: String,
    pub reminder_time: DateTime<Utc>,
    pub is_sent: bool,
}

// ============================================================================
// Users and Auth
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .or(self.email.as_deref())
            .unwrap_or("unknown user")
    }
}

/// Canonical result of a successful sign-in or sign-up.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUp {
    pub username: String,
    pub email: String,
    pub password: String,
}

// ============================================================================
// Link Graph Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: NoteId,
    pub title: String,
    /// Circle radius: content length / 50, clamped to [10, 30].
    pub size: f32,
    /// Degree in the derived link multiset.
    pub link_count: usize,
    pub is_starred: bool,
    pub content_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphEdge {
    pub source: NoteId,
    pub target: NoteId,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub stats: GraphStats,
}

impl NoteGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &NoteId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub orphan_count: usize, // Nodes with no resolved links
    pub linked_notes: usize, // Notes whose content contains `[[`
    pub max_degree: usize,
    pub avg_degree: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    #[test]
    fn test_note_accepts_alias_fields() {
        let note: Note = serde_json::from_value(json!({
            "noteId": 7,
            "title": "Rust",
            "content": "see [[Cargo]]",
            "starred": true,
            "updatedAt": "2024-03-01T10:00:00"
        }))
        .unwrap();
        assert_eq!(note.id, EntityId::Int(7));
        assert!(note.is_starred);
        assert_eq!(
            note.updated_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(note.created_at, None);
    }

    #[test]
    fn test_note_without_id_is_rejected() {
        let result: Result<Note, _> = serde_json::from_value(json!({"title": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_note_missing_text_fields_default_to_empty() {
        let note: Note = serde_json::from_value(json!({"id": "a1", "title": null})).unwrap();
        assert_eq!(note.title, "");
        assert_eq!(note.content, "");
        assert_eq!(note.display_title(), "Untitled");
    }

    #[test]
    fn test_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap();
        assert_eq!(timestamp::parse("2024-05-02T08:30:00Z"), Some(expected));
        assert_eq!(timestamp::parse("2024-05-02T10:30:00+02:00"), Some(expected));
        assert_eq!(timestamp::parse("2024-05-02T08:30"), Some(expected));
        assert_eq!(
            timestamp::from_value(&json!([2024, 5, 2, 8, 30])),
            Some(expected)
        );
        assert_eq!(
            timestamp::from_value(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(timestamp::parse("yesterday"), None);
    }

    #[test]
    fn test_reminder_wire_normalization() {
        let reminder: Reminder = serde_json::from_value(json!({
            "reminderId": 3,
            "note": {"noteId": 9, "title": "Groceries"},
            "message": "buy milk",
            "reminderTime": "2024-01-01T09:00:00Z",
            "sent": true
        }))
        .unwrap();
        assert_eq!(reminder.id, EntityId::Int(3));
        assert_eq!(reminder.note_id, Some(EntityId::Int(9)));
        assert_eq!(reminder.note_title.as_deref(), Some("Groceries"));
        assert!(reminder.is_sent);
    }

    #[test]
    fn test_reminder_status_classification() {
        let now = Utc::now();
        let hour = Duration::hours(1);
        assert_eq!(reminder_status(false, now - hour, now), ReminderStatus::Overdue);
        assert_eq!(reminder_status(true, now - hour, now), ReminderStatus::Completed);
        assert_eq!(reminder_status(true, now + hour, now), ReminderStatus::Completed);
        assert_eq!(reminder_status(false, now + hour, now), ReminderStatus::Pending);
        // Exactly due counts as overdue.
        assert_eq!(reminder_status(false, now, now), ReminderStatus::Overdue);
    }

    #[test]
    fn test_note_payload_defaults_title() {
        let payload = NoteDraft::new("   ", "body").to_payload();
        assert_eq!(payload.title, "Untitled");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["isStarred"], json!(false));
        assert_eq!(value["isEncrypted"], json!(false));
    }

    #[test]
    fn test_patch_keeps_star_state() {
        let current = Note {
            id: EntityId::Int(1),
            title: "Plan".into(),
            content: "old".into(),
            is_starred: true,
            created_at: None,
            updated_at: None,
        };
        let payload = NotePatch::content("new").apply_to(Some(&current));
        assert_eq!(payload.title, "Plan");
        assert_eq!(payload.content, "new");
        assert!(payload.is_starred);
    }

    #[test]
    fn test_reminder_payload_default_message() {
        let draft = ReminderDraft {
            note_id: EntityId::Int(4),
            message: String::new(),
            reminder_time: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(draft.to_payload(Some("Taxes"))).unwrap();
        assert_eq!(value["message"], json!("Reminder for: Taxes"));
        assert_eq!(value["note"]["noteId"], json!(4));
        assert_eq!(value["isSent"], json!(false));
    }

    #[test]
    fn test_entity_id_parse_and_roundtrip() {
        assert_eq!(EntityId::parse("42"), EntityId::Int(42));
        assert_eq!(EntityId::parse("abc-1"), EntityId::Text("abc-1".into()));
        assert_eq!(serde_json::to_value(EntityId::Int(5)).unwrap(), json!(5));
        assert_eq!(EntityId::Text("x".into()).to_string(), "x");
    }
}
