//! Account session lifecycle
//!
//! [`SessionManager`] exchanges the configured credentials for an id token and
//! hands the resulting [`Session`] to the price and usage facades. There is no
//! automatic refresh: a rejected or expired session is dropped and the caller
//! decides when to authenticate again.

use crate::config::Credentials;
use crate::decode;
use crate::error::{AmberError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::protocol::{Protocol, data_member};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use uuid::Uuid;

const SIGN_IN_PATH: &str = "Authentication/SignIn";

/// Account details returned alongside the tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub name: Option<String>,
    #[serde(default, rename = "firstName", deserialize_with = "decode::opt_string")]
    pub given_name: Option<String>,
    #[serde(default, rename = "lastName", deserialize_with = "decode::opt_string")]
    pub family_name: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub postcode: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInData {
    #[serde(flatten)]
    profile: AccountProfile,
    #[serde(default, deserialize_with = "decode::opt_string")]
    id_token: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    refresh_token: Option<String>,
}

/// Authenticated state granting access to account-scoped endpoints
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    id_token: String,
    refresh_token: Option<String>,
    profile: AccountProfile,
    service_response_type: Option<i64>,
    established_at: DateTime<Utc>,
}

impl Session {
    /// Decode a sign-in response body
    pub fn from_sign_in(body: serde_json::Value) -> Result<Self> {
        let service_response_type = body.get("serviceResponseType").and_then(|v| v.as_i64());
        let data = data_member(body, "sign-in")?;
        let data: SignInData = serde_json::from_value(data)
            .map_err(|e| AmberError::protocol(format!("Malformed sign-in response: {}", e)))?;

        let id_token = data
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AmberError::protocol("Sign-in response carries no id token"))?;

        Ok(Self {
            id: Uuid::new_v4(),
            id_token,
            refresh_token: data.refresh_token.filter(|t| !t.is_empty()),
            profile: data.profile,
            service_response_type,
            established_at: Utc::now(),
        })
    }

    /// Local identifier, useful to correlate log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn profile(&self) -> &AccountProfile {
        &self.profile
    }

    pub fn service_response_type(&self) -> Option<i64> {
        self.service_response_type
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("id_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("profile", &self.profile)
            .field("established_at", &self.established_at)
            .finish()
    }
}

/// Owns the credentials and the current session
///
/// Reads are lock-free in practice (a short `RwLock` read); writers are
/// serialized by an async mutex so two concurrent `authenticate()` calls
/// cannot interleave their clear/store steps.
pub struct SessionManager {
    protocol: Arc<Protocol>,
    credentials: Option<Credentials>,
    current: RwLock<Option<Arc<Session>>>,
    auth_lock: tokio::sync::Mutex<()>,
    logger: StructuredLogger,
}

impl SessionManager {
    pub fn new(protocol: Arc<Protocol>, credentials: Option<Credentials>) -> Self {
        Self {
            protocol,
            credentials,
            current: RwLock::new(None),
            auth_lock: tokio::sync::Mutex::new(()),
            logger: get_logger("session"),
        }
    }

    pub(crate) fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Whether credentials were supplied at construction
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// The active session, if any
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    /// The active session, or `SessionRequired` when there is none
    pub fn require(&self, operation: &str) -> Result<Arc<Session>> {
        self.current().ok_or_else(|| {
            AmberError::session_required(format!(
                "{} needs an authenticated session; call authenticate() first",
                operation
            ))
        })
    }

    /// Drop the current session
    pub fn logout(&self) {
        if self.replace(None).is_some() {
            self.logger.info("Session cleared");
        }
    }

    /// Drop `session` if it is still the active one
    ///
    /// Returns false when a newer session has replaced it in the meantime, in
    /// which case the newer one is left alone.
    pub fn invalidate_if_current(&self, session: &Arc<Session>) -> bool {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(active) if Arc::ptr_eq(active, session) => {
                *guard = None;
                drop(guard);
                self.logger.warn(&format!(
                    "Session {} rejected upstream; re-authentication required",
                    session.id()
                ));
                true
            }
            _ => false,
        }
    }

    /// Exchange the configured credentials for a new session
    pub async fn authenticate(&self) -> Result<Arc<Session>> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| AmberError::config("No username and password available"))?;

        let _writer = self.auth_lock.lock().await;
        // The previous session is gone whatever the outcome
        self.replace(None);

        self.logger
            .info(&format!("Authenticating as {}", credentials.username));
        let started = Instant::now();
        let result = self.sign_in(credentials).await;
        self.logger
            .outcome("authenticate", started.elapsed(), &result);

        let session = Arc::new(result?);
        self.replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let body = serde_json::json!({
            "username": credentials.username,
            "password": credentials.password,
        });

        let response = self
            .protocol
            .api_post(SIGN_IN_PATH, body, None)
            .await
            .map_err(|e| match e {
                AmberError::Fetch {
                    status: Some(400),
                    ..
                } => AmberError::auth("Credentials rejected (status 400)"),
                other => other,
            })?;

        Session::from_sign_in(response)
    }

    fn replace(&self, session: Option<Arc<Session>>) -> Option<Arc<Session>> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, session)
    }
}
