//! Rust SDK for the Baseline platform API.
//!
//! One [`Client`] aggregates the platform's services: relational queries
//! (`/rest/v1`), authentication (`/auth/v1`), object storage (`/storage/v1`),
//! realtime events (`/realtime/v1`), and edge functions (`/functions/v1`).
//! All sub-clients share a single
//! header set carrying the project `apiKey` and the current `Authorization`
//! bearer token; when the authentication state changes, the facade swaps the
//! token atomically for every sub-client and reconnects the realtime channel.
//!
//! ```no_run
//! use baseline_sdk::Client;
//!
//! # async fn run() -> Result<(), baseline_sdk::Error> {
//! let client = Client::new("https://xyz.baseline.dev", "project-api-key.jwt.sig")?;
//! let rows = client.from("todos").select("*").eq("done", "false").execute().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod functions;
mod headers;
mod options;
pub mod query;
pub mod realtime;
pub mod storage;

pub use auth::{AuthClient, AuthEvent, Session, User};
pub use error::Error;
pub use headers::SharedHeaders;
pub use options::ClientOptions;

use functions::FunctionsClient;
use query::{QueryBuilder, QueryClient};
use realtime::RealtimeClient;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use storage::StorageClient;

/// Header carrying the project API key on every request.
pub(crate) const API_KEY_HEADER: &str = "apikey";

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(https?)://.+").expect("valid url pattern"))
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9-_=]+\.[A-Za-z0-9-_=]+\.?[A-Za-z0-9-_.+/=]*$")
            .expect("valid key pattern")
    })
}

/// The client for interacting with the Baseline platform.
///
/// Owns one sub-client per service for its whole lifetime; sub-clients are
/// mutated in place (via the shared header set), never replaced.
#[derive(Clone)]
pub struct Client {
    base_url: String,
    api_key: String,
    headers: SharedHeaders,
    auth: Arc<AuthClient>,
    query: QueryClient,
    storage: StorageClient,
    realtime: Arc<RealtimeClient>,
    functions: FunctionsClient,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new [Client] with default options.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The URL of the project (e.g., `https://xyz.baseline.dev`).
    /// * `api_key` - The project API key, used both as the `apiKey` header and
    ///   as the default bearer token.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, Error> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Creates a new [Client].
    ///
    /// Credentials are validated before any sub-client is constructed; on
    /// failure no partial facade is observable.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.into();

        if base_url.is_empty() {
            return Err(Error::InvalidCredentials("base URL is required".to_string()));
        }
        if api_key.is_empty() {
            return Err(Error::InvalidCredentials("API key is required".to_string()));
        }
        if !url_pattern().is_match(&base_url) {
            return Err(Error::InvalidCredentials(format!(
                "invalid base URL: {base_url}"
            )));
        }
        if !key_pattern().is_match(&api_key) {
            return Err(Error::InvalidCredentials(
                "API key is not a well-formed JWT".to_string(),
            ));
        }

        let headers = SharedHeaders::new(initial_headers(&api_key, &options.headers)?);
        let http_client = reqwest::Client::new();

        let auth = Arc::new(AuthClient::new(
            http_client.clone(),
            format!("{base_url}/auth/v1"),
            headers.clone(),
        ));
        let query = QueryClient::new(
            http_client.clone(),
            format!("{base_url}/rest/v1"),
            headers.clone(),
            options.schema.clone(),
        );
        let storage = StorageClient::new(
            http_client.clone(),
            format!("{base_url}/storage/v1"),
            headers.clone(),
        );
        let realtime = Arc::new(RealtimeClient::new(
            realtime_url(&base_url),
            headers.clone(),
            api_key.clone(),
        ));
        let functions = FunctionsClient::new(
            http_client,
            format!("{base_url}/functions/v1"),
            headers.clone(),
        );

        let client = Self {
            base_url,
            api_key,
            headers,
            auth,
            query,
            storage,
            realtime,
            functions,
        };
        client.register_auth_listener();
        Ok(client)
    }

    /// Returns the auth sub-client.
    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// Returns the query sub-client.
    pub fn query(&self) -> &QueryClient {
        &self.query
    }

    /// Returns the storage sub-client.
    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    /// Returns the realtime sub-client.
    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    /// Returns the functions sub-client.
    pub fn functions(&self) -> &FunctionsClient {
        &self.functions
    }

    /// Returns a snapshot of the canonical header set.
    pub fn headers(&self) -> HeaderMap {
        self.headers.snapshot()
    }

    /// Returns the base URL of the project.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts a query against a table or view.
    pub fn from(&self, table: &str) -> QueryBuilder {
        self.query.from(table)
    }

    /// Calls a stored procedure.
    pub async fn rpc(&self, function: &str, params: Value) -> Result<Value, Error> {
        self.query.rpc(function, params).await
    }

    /// Applies an authentication state change to the whole facade.
    ///
    /// `SIGNED_IN` and `TOKEN_REFRESHED` rotate the shared `Authorization`
    /// header to the session's access token; `SIGNED_OUT` reverts it to the
    /// key-based default. Other events leave the headers untouched. The swap
    /// is one atomic publish, so no sub-client can observe a partial update.
    ///
    /// A realtime reconnect is attempted under the new token; failures are
    /// logged and never propagated from this path.
    pub async fn on_auth_event(&self, event: AuthEvent, session: Option<&Session>) {
        let Some(token) = resolve_token(&self.api_key, event, session) else {
            tracing::debug!(event = %event, "auth event does not rotate credentials");
            return;
        };
        apply_token(&self.headers, &self.realtime, &token);
        // Recoverable and already logged by connect_realtime.
        let _ = self.connect_realtime().await;
    }

    /// (Re)establishes the realtime connection with the current credentials.
    ///
    /// Failures are logged at error level and returned as
    /// [`Error::ConnectionFailed`]; the facade stays valid and the call may be
    /// retried.
    pub async fn connect_realtime(&self) -> Result<(), Error> {
        match self.realtime.connect().await {
            Ok(()) => {
                tracing::info!("realtime channel connected");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "realtime connection failed");
                Err(err)
            }
        }
    }

    /// Registers the facade's listener with the auth sub-client so that
    /// sign-in, refresh, and sign-out rotate every sub-client's credentials.
    fn register_auth_listener(&self) {
        let headers = self.headers.clone();
        let api_key = self.api_key.clone();
        let realtime = self.realtime.clone();
        self.auth.on_auth_state_change(move |event, session| {
            let Some(token) = resolve_token(&api_key, event, session) else {
                return;
            };
            apply_token(&headers, &realtime, &token);
            let realtime = realtime.clone();
            tokio::spawn(async move {
                if let Err(err) = realtime.connect().await {
                    tracing::error!(error = %err, "realtime reconnect after auth state change failed");
                }
            });
        });
    }
}

/// Computes the token a given auth event rotates to, or `None` when the event
/// leaves credentials untouched. A missing session falls back to the key.
fn resolve_token(api_key: &str, event: AuthEvent, session: Option<&Session>) -> Option<String> {
    match event {
        AuthEvent::SignedIn | AuthEvent::TokenRefreshed => Some(
            session
                .map(|session| session.access_token.clone())
                .unwrap_or_else(|| api_key.to_string()),
        ),
        AuthEvent::SignedOut => Some(api_key.to_string()),
        AuthEvent::UserUpdated | AuthEvent::PasswordRecovery => None,
    }
}

fn apply_token(headers: &SharedHeaders, realtime: &RealtimeClient, token: &str) {
    match bearer(token) {
        Ok(value) => headers.set_authorization(value),
        Err(_) => {
            tracing::error!("access token is not a valid header value; keeping previous credentials");
            return;
        }
    }
    realtime.set_auth(token);
}

fn bearer(token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}"))
}

fn initial_headers(api_key: &str, overlay: &HeaderMap) -> Result<HeaderMap, Error> {
    let invalid =
        |_| Error::InvalidCredentials("API key is not a valid header value".to_string());

    let mut map = HeaderMap::new();
    map.insert(
        API_KEY_HEADER,
        HeaderValue::from_str(api_key).map_err(invalid)?,
    );
    map.insert(AUTHORIZATION, bearer(api_key).map_err(invalid)?);

    for (name, value) in overlay {
        // The overlay never touches the key header.
        if name.as_str().eq_ignore_ascii_case(API_KEY_HEADER) {
            continue;
        }
        map.insert(name.clone(), value.clone());
    }
    Ok(map)
}

fn realtime_url(base_url: &str) -> String {
    // http -> ws, https -> wss
    format!("{base_url}/realtime/v1").replacen("http", "ws", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_switches_scheme() {
        assert_eq!(
            realtime_url("http://localhost:54321"),
            "ws://localhost:54321/realtime/v1"
        );
        assert_eq!(
            realtime_url("https://xyz.baseline.dev"),
            "wss://xyz.baseline.dev/realtime/v1"
        );
    }

    #[test]
    fn signed_out_reverts_to_api_key() {
        let session = Session::new("userjwt");
        assert_eq!(
            resolve_token("anon", AuthEvent::SignedIn, Some(&session)).as_deref(),
            Some("userjwt")
        );
        assert_eq!(
            resolve_token("anon", AuthEvent::SignedOut, None).as_deref(),
            Some("anon")
        );
    }

    #[test]
    fn non_credential_events_do_not_rotate() {
        let session = Session::new("userjwt");
        assert_eq!(
            resolve_token("anon", AuthEvent::UserUpdated, Some(&session)),
            None
        );
        assert_eq!(
            resolve_token("anon", AuthEvent::PasswordRecovery, None),
            None
        );
    }

    #[test]
    fn overlay_cannot_override_api_key() {
        let mut overlay = HeaderMap::new();
        overlay.insert(API_KEY_HEADER, HeaderValue::from_static("forged"));
        overlay.insert(AUTHORIZATION, HeaderValue::from_static("Bearer custom"));

        let map = initial_headers("anon", &overlay).unwrap();
        assert_eq!(map.get(API_KEY_HEADER).unwrap(), "anon");
        assert_eq!(map.get(AUTHORIZATION).unwrap(), "Bearer custom");
    }
}
