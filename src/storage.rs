//! Durable client-side storage.
//!
//! A small sled database holds what a browser client would keep in local
//! storage: the bearer token, the signed-in user and the dark-mode flag.
//! Keys are fixed so that any client build reads the same values.

use std::path::Path;

use crate::error::Result;
use crate::models::{AuthSession, User};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const DARK_MODE_KEY: &str = "darkMode";

/// Handle to the credential and preference store. Cloning shares the database.
#[derive(Clone)]
pub struct CredentialStore {
    db: sled::Db,
}

impl CredentialStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// In-memory store removed on drop; used by tests and one-shot sessions.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.db.get(key) {
            Ok(Some(bytes)) => String::from_utf8(bytes.to_vec()).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read client storage");
                None
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.get_string(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// The stored user; a corrupt entry reads as absent.
    pub fn user(&self) -> Option<User> {
        let raw = self.get_string(USER_KEY)?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save_session(&self, session: &AuthSession) -> Result<()> {
        let user_json = serde_json::to_string(&session.user)?;
        self.db.insert(TOKEN_KEY, session.token.as_bytes())?;
        self.db.insert(USER_KEY, user_json.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// Removes both `token` and `user`.
    pub fn clear_session(&self) -> Result<()> {
        self.db.remove(TOKEN_KEY)?;
        self.db.remove(USER_KEY)?;
        self.db.flush()?;
        Ok(())
    }

    /// Dark mode is on unless the user turned it off.
    pub fn dark_mode(&self) -> bool {
        self.get_string(DARK_MODE_KEY)
            .and_then(|raw| serde_json::from_str::<bool>(&raw).ok())
            .unwrap_or(true)
    }

    pub fn set_dark_mode(&self, enabled: bool) -> Result<()> {
        let raw = serde_json::to_string(&enabled)?;
        self.db.insert(DARK_MODE_KEY, raw.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}
