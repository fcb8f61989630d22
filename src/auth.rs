//! Authentication and session management.
//!
//! Sign-in and sign-up exchange credentials for a bearer token which is kept
//! in the [`CredentialStore`]. Responses are normalized into one
//! [`AuthSession`] shape; the accepted wire variants are:
//!
//! - `{ "token": "...", "user": { ... } }`
//! - `{ "accessToken": "...", "user": { ... } }`
//! - `{ "token" | "accessToken": "...", <user fields> }` (the body is the user)

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::api::{endpoints, ApiClient, ApiRequest};
use crate::error::{ClientError, Result};
use crate::models::{AuthSession, SignIn, SignUp, User};

// ============================================================================
// Response Normalization
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponseWire {
    token: Option<String>,
    access_token: Option<String>,
    user: Option<User>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

pub fn normalize_auth_response(body: Value) -> Result<AuthSession> {
    let wire: AuthResponseWire =
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;

    let token = wire
        .token
        .or(wire.access_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ClientError::Decode("auth response carries no token".to_string()))?;

    let user = match wire.user {
        Some(user) => user,
        None => serde_json::from_value(Value::Object(wire.rest))
            .map_err(|e| ClientError::Decode(e.to_string()))?,
    };

    Ok(AuthSession { token, user })
}

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    valid: bool,
}

// ============================================================================
// Auth Service
// ============================================================================

#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.store().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.client.store().user()
    }

    pub async fn login(&self, credentials: &SignIn) -> Result<AuthSession> {
        let request = ApiRequest::post(endpoints::SIGN_IN)
            .json(credentials)?
            .anonymous();
        let session = normalize_auth_response(self.client.send(&request).await?)?;
        self.client.store().save_session(&session)?;
        tracing::info!(user = %session.user.display_name(), "signed in");
        Ok(session)
    }

    pub async fn register(&self, form: &SignUp) -> Result<AuthSession> {
        let request = ApiRequest::post(endpoints::SIGN_UP).json(form)?.anonymous();
        let session = normalize_auth_response(self.client.send(&request).await?)?;
        self.client.store().save_session(&session)?;
        tracing::info!(user = %session.user.display_name(), "account created");
        Ok(session)
    }

    /// Ask the backend whether the stored token is still good. No token, a
    /// 401 (which clears the store) or a body without `valid: true` reads as
    /// `false`.
    pub async fn validate(&self) -> Result<bool> {
        if !self.is_authenticated() {
            return Ok(false);
        }
        match self.client.send(&ApiRequest::post(endpoints::VALIDATE)).await {
            Ok(Value::Null) => Ok(false),
            Ok(body) => {
                let parsed: ValidateResponse =
                    serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
                Ok(parsed.valid)
            }
            Err(ClientError::Unauthorized) | Err(ClientError::Forbidden) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Validate the stored session at startup. An invalid token is dropped;
    /// transport failures propagate and leave the stored session alone.
    pub async fn restore_session(&self) -> Result<Option<User>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        if self.validate().await? {
            Ok(Some(self.current_user().unwrap_or_default()))
        } else {
            tracing::info!("stored session is no longer valid");
            self.client.store().clear_session()?;
            Ok(None)
        }
    }

    /// Local credentials are cleared even when the backend call fails.
    pub async fn logout(&self) -> Result<()> {
        if self.is_authenticated() {
            if let Err(e) = self.client.send(&ApiRequest::post(endpoints::LOGOUT)).await {
                tracing::warn!(error = %e, "logout request failed, clearing local session anyway");
            }
        }
        self.client.store().clear_session()
    }
}
