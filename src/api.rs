//! HTTP transport to the backend.
//!
//! Every request goes through [`ApiClient::send`], which attaches the stored
//! bearer token, maps HTTP status codes onto [`ClientError`] and treats a 401
//! on an authenticated request as session invalidation (the stored token and
//! user are cleared; the UI notices on its next state check).

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::storage::CredentialStore;

// ============================================================================
// Endpoints
// ============================================================================

pub mod endpoints {
    use crate::models::EntityId;

    pub const SIGN_IN: &str = "/api/auth/signin";
    pub const SIGN_UP: &str = "/api/auth/signup";
    pub const VALIDATE: &str = "/api/auth/validate";
    pub const LOGOUT: &str = "/api/auth/logout";

    pub const NOTES: &str = "/api/notes";
    pub const NOTE_SEARCH: &str = "/api/notes/search";

    pub const REMINDERS: &str = "/api/reminders";
    pub const PENDING_REMINDERS: &str = "/api/reminders/pending";

    fn segment(id: &EntityId) -> String {
        urlencoding::encode(&id.to_string()).into_owned()
    }

    pub fn note(id: &EntityId) -> String {
        format!("{}/{}", NOTES, segment(id))
    }

    pub fn note_star(id: &EntityId) -> String {
        format!("{}/{}/star", NOTES, segment(id))
    }

    pub fn reminder(id: &EntityId) -> String {
        format!("{}/{}", REMINDERS, segment(id))
    }

    pub fn reminder_mark_sent(id: &EntityId) -> String {
        format!("{}/{}/mark-sent", REMINDERS, segment(id))
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Whether the stored bearer token is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Bearer,
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    credentials: Credentials,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            credentials: Credentials::Bearer,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.credentials = Credentials::Anonymous;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }
}

// ============================================================================
// Client
// ============================================================================

/// Explicitly constructed backend client. Cloning is cheap and shares the
/// connection pool and the credential store.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    store: CredentialStore,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, store: CredentialStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let mut base_url = config.api_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            store,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Send a request and return the decoded JSON body (`Null` when empty).
    pub async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let url = self.url(&request.path)?;
        tracing::debug!(method = %request.method, path = %request.path, "backend request");

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if request.credentials == Credentials::Bearer {
            if let Some(token) = self.store.token() {
                builder = builder.bearer_auth(token);
            }
        }

        let response = builder.send().await?;
        self.read_response(response, request).await
    }

    /// Like [`send`](Self::send), but a 403 is retried once without
    /// credentials, treating the resource as possibly public.
    pub async fn send_with_public_fallback(&self, request: ApiRequest) -> Result<Value> {
        match self.send(&request).await {
            Err(ClientError::Forbidden) if request.credentials == Credentials::Bearer => {
                tracing::warn!(path = %request.path, "403 from backend, retrying without credentials");
                self.send(&request.anonymous()).await
            }
            other => other,
        }
    }

    async fn read_response(&self, response: Response, request: &ApiRequest) -> Result<Value> {
        let status = response.status();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            return Ok(body);
        }

        tracing::debug!(status = status.as_u16(), path = %request.path, "backend rejected request");
        let message = server_message(&body);
        match status {
            StatusCode::UNAUTHORIZED => {
                if request.credentials == Credentials::Bearer {
                    if let Err(e) = self.store.clear_session() {
                        tracing::warn!(error = %e, "failed to clear credentials after 401");
                    }
                }
                Err(ClientError::Unauthorized)
            }
            StatusCode::FORBIDDEN => Err(ClientError::Forbidden),
            StatusCode::NOT_FOUND => Err(ClientError::not_found(request.path.clone())),
            s if s.is_client_error() => Err(ClientError::Rejected {
                status: s.as_u16(),
                message,
            }),
            s => Err(ClientError::Server {
                status: s.as_u16(),
                message,
            }),
        }
    }
}

/// The human-readable message a backend error body carries, if any.
fn server_message(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

// ============================================================================
// Decoding Helpers
// ============================================================================

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

/// List endpoints: anything that is not a JSON array reads as empty.
pub fn decode_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    match value {
        Value::Array(_) => decode(value),
        other => {
            if !other.is_null() {
                tracing::debug!("list endpoint returned a non-array body, treating as empty");
            }
            Ok(Vec::new())
        }
    }
}
