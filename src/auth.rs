//! Client for the auth service.
//!
//! Handles the password grant, token refresh, and sign-out endpoints, keeps
//! the current [`Session`], and broadcasts state changes to registered
//! listeners. The facade registers a listener at construction that rotates the
//! shared `Authorization` header and reconnects the realtime channel.

use crate::{error::Error, headers::SharedHeaders};
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

/// An authentication state change broadcast to registered listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    TokenRefreshed,
    SignedOut,
    UserUpdated,
    PasswordRecovery,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::UserUpdated => "USER_UPDATED",
            AuthEvent::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated user attached to a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A session issued by the auth service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Creates a bare session carrying only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in: None,
            expires_at: None,
            user: None,
        }
    }

    /// Whether the access token is at or past its expiry time.
    ///
    /// Sessions without expiry information are treated as live.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Utc::now().timestamp() >= at)
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

type AuthListener = Box<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

/// Client for the auth service.
pub struct AuthClient {
    http_client: reqwest::Client,
    base_url: String,
    headers: SharedHeaders,
    session: RwLock<Option<Session>>,
    listeners: RwLock<Vec<AuthListener>>,
}

impl AuthClient {
    pub(crate) fn new(
        http_client: reqwest::Client,
        base_url: String,
        headers: SharedHeaders,
    ) -> Self {
        Self {
            http_client,
            base_url,
            headers,
            session: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Returns a snapshot of the headers this client sends.
    pub fn headers(&self) -> HeaderMap {
        self.headers.snapshot()
    }

    /// Returns a copy of the current session, if signed in.
    pub fn session(&self) -> Option<Session> {
        self.session.read().expect("session lock poisoned").clone()
    }

    /// Registers a listener invoked on every authentication state change.
    pub fn on_auth_state_change(
        &self,
        listener: impl Fn(AuthEvent, Option<&Session>) + Send + Sync + 'static,
    ) {
        self.listeners
            .write()
            .expect("auth listener lock poisoned")
            .push(Box::new(listener));
    }

    /// Signs in with an email and password, storing the returned session and
    /// notifying listeners with `SIGNED_IN`.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, Error> {
        let url = format!("{}/token?grant_type=password", self.base_url);
        let res = self
            .http_client
            .post(&url)
            .headers(self.headers.snapshot())
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let session = Self::session_from_response(res).await?;
        self.store_session(Some(session.clone()));
        self.notify(AuthEvent::SignedIn, Some(&session));
        Ok(session)
    }

    /// Exchanges the stored refresh token for a new session, notifying
    /// listeners with `TOKEN_REFRESHED`.
    pub async fn refresh_session(&self) -> Result<Session, Error> {
        let refresh_token = self
            .session()
            .and_then(|session| session.refresh_token)
            .ok_or_else(|| Error::Internal("no refresh token available".to_string()))?;

        let url = format!("{}/token?grant_type=refresh_token", self.base_url);
        let res = self
            .http_client
            .post(&url)
            .headers(self.headers.snapshot())
            .json(&RefreshGrant {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;

        let session = Self::session_from_response(res).await?;
        self.store_session(Some(session.clone()));
        self.notify(AuthEvent::TokenRefreshed, Some(&session));
        Ok(session)
    }

    /// Revokes the current session and notifies listeners with `SIGNED_OUT`.
    ///
    /// An already-revoked token (401) still clears local state.
    pub async fn sign_out(&self) -> Result<(), Error> {
        let url = format!("{}/logout", self.base_url);
        let res = self
            .http_client
            .post(&url)
            .headers(self.headers.snapshot())
            .send()
            .await?;

        if !res.status().is_success() && res.status() != StatusCode::UNAUTHORIZED {
            return Err(Self::error_from_response(res).await);
        }

        self.store_session(None);
        self.notify(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn session_from_response(res: reqwest::Response) -> Result<Session, Error> {
        if !res.status().is_success() {
            return Err(Self::error_from_response(res).await);
        }
        let mut session: Session = res.json().await?;
        if session.expires_at.is_none() {
            session.expires_at = session
                .expires_in
                .map(|secs| Utc::now().timestamp() + secs);
        }
        Ok(session)
    }

    async fn error_from_response(res: reqwest::Response) -> Error {
        let status = res.status();
        let message = match res.json::<ErrorPayload>().await {
            Ok(payload) => payload
                .error_description
                .or(payload.msg)
                .or(payload.error)
                .unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Error::Auth { status, message }
    }

    fn store_session(&self, session: Option<Session>) {
        *self.session.write().expect("session lock poisoned") = session;
    }

    fn notify(&self, event: AuthEvent, session: Option<&Session>) {
        let listeners = self.listeners.read().expect("auth listener lock poisoned");
        for listener in listeners.iter() {
            listener(event, session);
        }
        tracing::debug!(event = %event, listeners = listeners.len(), "auth state change dispatched");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_wire_format() {
        assert_eq!(AuthEvent::SignedIn.to_string(), "SIGNED_IN");
        assert_eq!(AuthEvent::TokenRefreshed.to_string(), "TOKEN_REFRESHED");
        assert_eq!(AuthEvent::SignedOut.to_string(), "SIGNED_OUT");
    }

    #[test]
    fn bare_session_defaults() {
        let session = Session::new("jwt");
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.token_type, "bearer");
        assert!(session.refresh_token.is_none());
        assert!(!session.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let mut session = Session::new("jwt");
        session.expires_at = Some(Utc::now().timestamp() - 60);
        assert!(session.is_expired());

        session.expires_at = Some(Utc::now().timestamp() + 3600);
        assert!(!session.is_expired());
    }

    #[test]
    fn session_deserializes_without_optional_fields() {
        let session: Session =
            serde_json::from_str(r#"{"access_token": "jwt"}"#).unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.token_type, "bearer");
        assert!(session.expires_at.is_none());
    }

    #[test]
    fn listeners_receive_notifications() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let client = AuthClient::new(
            reqwest::Client::new(),
            "http://localhost/auth/v1".to_string(),
            SharedHeaders::new(HeaderMap::new()),
        );
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        client.on_auth_state_change(move |event, session| {
            assert_eq!(event, AuthEvent::SignedIn);
            assert_eq!(session.unwrap().access_token, "jwt");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.notify(AuthEvent::SignedIn, Some(&Session::new("jwt")));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
