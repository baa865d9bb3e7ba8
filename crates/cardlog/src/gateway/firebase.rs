//! Firebase Realtime Database gateway.
//!
//! Talks to the database's REST API: a scalar write is a `PUT` of a JSON
//! string to `<url>/<path>.json`, a subtree read is a `GET` of the same URL.
//! When an API key is configured the gateway signs in anonymously through the
//! Identity Toolkit API and sends the resulting ID token as `auth=`, refreshing
//! it shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{KeyPath, PersistenceGateway};
use crate::error::{Error, Result};
use crate::retry::{retry_async, RetryPolicy};

const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const REFRESH_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh the ID token this long before it actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Gateway to a Firebase Realtime Database.
pub struct FirebaseGateway {
    client: reqwest::Client,
    database_url: String,
    api_key: Option<String>,
    session: Mutex<Option<Session>>,
}

struct Session {
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl std::fmt::Debug for FirebaseGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseGateway")
            .field("database_url", &self.database_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl Session {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    local_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

impl FirebaseGateway {
    /// Create a gateway for `database_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(database_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            database_url: database_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            session: Mutex::new(None),
        })
    }

    fn node_url(&self, path: &KeyPath, token: Option<&str>) -> String {
        let mut url = if path.is_root() {
            format!("{}/.json", self.database_url)
        } else {
            format!("{}{path}.json", self.database_url)
        };
        if let Some(token) = token {
            url.push_str("?auth=");
            url.push_str(token);
        }
        url
    }

    /// Perform one anonymous sign-in request.
    async fn sign_in(&self, api_key: &str) -> Result<Session> {
        let response = self
            .client
            .post(format!("{SIGN_UP_URL}?key={api_key}"))
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|e| Error::auth(sanitize(&e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!("HTTP {status}: {}", error_reason(&body))));
        }

        let payload: SignUpResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("unexpected sign-in response: {}", sanitize(&e))))?;
        info!(
            "Signed in anonymously as {}",
            payload.local_id.as_deref().unwrap_or("unknown user")
        );
        Ok(Session {
            expires_at: Instant::now() + parse_expires_in(&payload.expires_in),
            id_token: payload.id_token,
            refresh_token: payload.refresh_token,
        })
    }

    async fn refresh(&self, api_key: &str, refresh_token: &str) -> Result<Session> {
        let response = self
            .client
            .post(format!("{REFRESH_URL}?key={api_key}"))
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(|e| Error::auth(sanitize(&e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "token refresh HTTP {status}: {}",
                error_reason(&body)
            )));
        }

        let payload: RefreshResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("unexpected refresh response: {}", sanitize(&e))))?;
        debug!("Refreshed ID token");
        Ok(Session {
            expires_at: Instant::now() + parse_expires_in(&payload.expires_in),
            id_token: payload.id_token,
            refresh_token: payload.refresh_token,
        })
    }

    /// The ID token to send, signing in or refreshing as needed.
    ///
    /// `None` when no API key is configured.
    async fn auth_token(&self) -> Result<Option<String>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        let mut session = self.session.lock().await;
        let now = Instant::now();
        let next = match session.as_ref() {
            Some(current) if current.is_fresh(now) => return Ok(Some(current.id_token.clone())),
            Some(current) => match self.refresh(api_key, &current.refresh_token).await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!("Token refresh failed ({e}), signing in again");
                    self.sign_in(api_key).await?
                }
            },
            None => self.sign_in(api_key).await?,
        };
        let token = next.id_token.clone();
        *session = Some(next);
        Ok(Some(token))
    }
}

#[async_trait]
impl PersistenceGateway for FirebaseGateway {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn connect(&self, policy: &RetryPolicy) -> Result<()> {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("No API key configured, using unauthenticated database access");
            return Ok(());
        };

        let session = retry_async(policy, "anonymous sign-in", |_| self.sign_in(api_key))
            .await
            .map_err(|exhausted| match exhausted.last_error {
                Some(err) => Error::auth(format!("{} ({err})", exhausted.reason)),
                None => Error::Timeout {
                    operation: "anonymous sign-in".to_string(),
                },
            })?;
        *self.session.lock().await = Some(session);
        Ok(())
    }

    async fn upsert_field(&self, path: &KeyPath, value: &str) -> Result<()> {
        let operation = format!("write {path}");
        let token = self
            .auth_token()
            .await
            .map_err(|e| Error::remote(&operation, e.to_string()))?;

        let response = self
            .client
            .put(self.node_url(path, token.as_deref()))
            .json(&Value::String(value.to_string()))
            .send()
            .await
            .map_err(|e| Error::remote(&operation, sanitize(&e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                operation,
                format!("HTTP {status}: {}", error_reason(&body)),
            ));
        }
        debug!("Wrote {}", path);
        Ok(())
    }

    async fn read_subtree(&self, path: &KeyPath) -> Result<Value> {
        let operation = format!("read {path}");
        let token = self
            .auth_token()
            .await
            .map_err(|e| Error::remote(&operation, e.to_string()))?;

        let response = self
            .client
            .get(self.node_url(path, token.as_deref()))
            .send()
            .await
            .map_err(|e| Error::remote(&operation, sanitize(&e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                operation,
                format!("HTTP {status}: {}", error_reason(&body)),
            ));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| Error::remote(&operation, format!("invalid JSON: {}", sanitize(&e))))?;
        if document.is_null() {
            return Err(Error::NotFound {
                path: path.to_string(),
            });
        }
        Ok(document)
    }
}

/// Token lifetime from an `expiresIn` field ("3600"), defaulting to an hour.
fn parse_expires_in(value: &str) -> Duration {
    value
        .trim()
        .parse::<u64>()
        .map_or(Duration::from_secs(3600), Duration::from_secs)
}

/// Pull a readable reason out of a Firebase error body.
///
/// The database answers `{"error": "Permission denied"}`; the auth APIs answer
/// `{"error": {"code": 400, "message": "ADMIN_ONLY_OPERATION"}}`.
fn error_reason(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value.get("error") {
            Some(Value::String(message)) => return message.clone(),
            Some(Value::Object(error)) => {
                if let Some(message) = error.get("message").and_then(Value::as_str) {
                    return message.to_string();
                }
            }
            _ => {}
        }
    }
    compact_body(body)
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

fn compact_body(body: &str) -> String {
    body.trim().chars().take(180).collect()
}
