//! Kairo client library.
//!
//! Everything the Kairo note-taking client does short of drawing pixels:
//! the REST transport and its credential handling, the note and reminder
//! stores, the editor session with debounced auto-save, wiki-link
//! extraction, the note graph with its force-directed layout, search
//! ranking and the reminder notification channel.
//!
//! - `api`, `backend`: HTTP transport and the backend traits
//! - `auth`, `storage`: sessions and durable client state
//! - `notes`, `graph`, `layout`: links, graph building and layout
//! - `note_store`, `reminders`, `editor`, `search`: session state
//! - `notify`: toasts, notifications and the pending-reminder poller
//! - `workspace`: the pieces wired together for a host

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod debounce;
pub mod editor;
pub mod error;
pub mod graph;
pub mod layout;
pub mod models;
pub mod note_store;
pub mod notes;
pub mod notify;
pub mod reminders;
pub mod search;
pub mod storage;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use api::ApiClient;
pub use auth::AuthService;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use storage::CredentialStore;
pub use workspace::Workspace;

// ============================================================================
// Client
// ============================================================================

/// Storage, transport and auth opened from one configuration.
#[derive(Clone)]
pub struct Client {
    pub config: ClientConfig,
    pub api: ApiClient,
    pub auth: AuthService,
}

impl Client {
    pub fn open(config: ClientConfig) -> Result<Self> {
        let store = CredentialStore::open(&config.db_path)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: ClientConfig, store: CredentialStore) -> Result<Self> {
        let api = ApiClient::new(&config, store)?;
        let auth = AuthService::new(api.clone());
        Ok(Self { config, api, auth })
    }

    pub fn store(&self) -> &CredentialStore {
        self.api.store()
    }

    /// Workspace over the HTTP backend, reporting through `sink`.
    pub fn workspace(&self, sink: Arc<dyn notify::NotificationSink>) -> Workspace<ApiClient> {
        Workspace::new(Arc::new(self.api.clone()), &self.config, sink)
    }
}
