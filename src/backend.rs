//! Backend service seams.
//!
//! The stores depend on these traits rather than on [`ApiClient`] directly so
//! that reconciliation logic can be exercised against an in-memory backend.

use async_trait::async_trait;

use crate::api::{decode, decode_list, endpoints, ApiClient, ApiRequest};
use crate::error::{ClientError, Result};
use crate::models::{Note, NoteId, NotePayload, Reminder, ReminderId, ReminderPayload};

#[async_trait]
pub trait NoteBackend: Send + Sync {
    async fn list_notes(&self) -> Result<Vec<Note>>;
    async fn get_note(&self, id: &NoteId) -> Result<Note>;
    async fn create_note(&self, payload: &NotePayload) -> Result<Note>;
    async fn update_note(&self, id: &NoteId, payload: &NotePayload) -> Result<Note>;
    async fn delete_note(&self, id: &NoteId) -> Result<()>;
    /// Server-side toggle; returns the note as the server now has it.
    async fn toggle_star(&self, id: &NoteId) -> Result<Note>;
    async fn search_notes(&self, query: &str) -> Result<Vec<Note>>;
}

#[async_trait]
pub trait ReminderBackend: Send + Sync {
    async fn list_reminders(&self) -> Result<Vec<Reminder>>;
    async fn get_reminder(&self, id: &ReminderId) -> Result<Reminder>;
    async fn create_reminder(&self, payload: &ReminderPayload) -> Result<Reminder>;
    async fn update_reminder(&self, id: &ReminderId, payload: &ReminderPayload) -> Result<Reminder>;
    async fn delete_reminder(&self, id: &ReminderId) -> Result<()>;
    /// Due but not yet sent.
    async fn pending_reminders(&self) -> Result<Vec<Reminder>>;
    /// The response body is not relied on; callers flip `is_sent` locally.
    async fn mark_sent(&self, id: &ReminderId) -> Result<()>;
}

// ============================================================================
// HTTP Implementation
// ============================================================================

impl ApiClient {
    /// Reminder endpoints refuse to run without a stored token.
    pub fn ensure_authenticated(&self) -> Result<()> {
        if self.store().is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }
}

#[async_trait]
impl NoteBackend for ApiClient {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        let body = self
            .send_with_public_fallback(ApiRequest::get(endpoints::NOTES))
            .await?;
        decode_list(body)
    }

    async fn get_note(&self, id: &NoteId) -> Result<Note> {
        let body = self
            .send_with_public_fallback(ApiRequest::get(endpoints::note(id)))
            .await?;
        decode(body)
    }

    async fn create_note(&self, payload: &NotePayload) -> Result<Note> {
        let request = ApiRequest::post(endpoints::NOTES).json(payload)?;
        decode(self.send_with_public_fallback(request).await?)
    }

    async fn update_note(&self, id: &NoteId, payload: &NotePayload) -> Result<Note> {
        let request = ApiRequest::put(endpoints::note(id)).json(payload)?;
        decode(self.send_with_public_fallback(request).await?)
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.send_with_public_fallback(ApiRequest::delete(endpoints::note(id)))
            .await?;
        Ok(())
    }

    async fn toggle_star(&self, id: &NoteId) -> Result<Note> {
        let body = self
            .send_with_public_fallback(ApiRequest::post(endpoints::note_star(id)))
            .await?;
        decode(body)
    }

    async fn search_notes(&self, query: &str) -> Result<Vec<Note>> {
        let request = ApiRequest::get(endpoints::NOTE_SEARCH).query("q", query);
        decode_list(self.send_with_public_fallback(request).await?)
    }
}

#[async_trait]
impl ReminderBackend for ApiClient {
    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        self.ensure_authenticated()?;
        decode_list(self.send(&ApiRequest::get(endpoints::REMINDERS)).await?)
    }

    async fn get_reminder(&self, id: &ReminderId) -> Result<Reminder> {
        self.ensure_authenticated()?;
        decode(self.send(&ApiRequest::get(endpoints::reminder(id))).await?)
    }

    async fn create_reminder(&self, payload: &ReminderPayload) -> Result<Reminder> {
        self.ensure_authenticated()?;
        let request = ApiRequest::post(endpoints::REMINDERS).json(payload)?;
        decode(self.send(&request).await?)
    }

    async fn update_reminder(&self, id: &ReminderId, payload: &ReminderPayload) -> Result<Reminder> {
        self.ensure_authenticated()?;
        let request = ApiRequest::put(endpoints::reminder(id)).json(payload)?;
        decode(self.send(&request).await?)
    }

    async fn delete_reminder(&self, id: &ReminderId) -> Result<()> {
        self.ensure_authenticated()?;
        self.send(&ApiRequest::delete(endpoints::reminder(id))).await?;
        Ok(())
    }

    async fn pending_reminders(&self) -> Result<Vec<Reminder>> {
        self.ensure_authenticated()?;
        decode_list(self.send(&ApiRequest::get(endpoints::PENDING_REMINDERS)).await?)
    }

    async fn mark_sent(&self, id: &ReminderId) -> Result<()> {
        self.ensure_authenticated()?;
        self.send(&ApiRequest::post(endpoints::reminder_mark_sent(id)))
            .await?;
        Ok(())
    }
}
