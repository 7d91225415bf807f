use reqwest::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors that can occur when interacting with the Baseline API.
#[derive(Error, Debug)]
pub enum Error {
    /// The base URL or API key handed to the client was malformed.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// The realtime connection could not be established. Recoverable: the
    /// facade stays usable and a later connect may succeed.
    #[error("realtime connection failed: {0}")]
    ConnectionFailed(String),
    /// The auth service rejected a request.
    #[error("auth error ({status}): {message}")]
    Auth {
        /// HTTP status returned by the auth service.
        status: StatusCode,
        /// Error description taken from the response body.
        message: String,
    },
    /// An error from the underlying `reqwest` HTTP client.
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// An error parsing a URL.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// An error from the underlying WebSocket client.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// An error serializing or deserializing JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// An HTTP error response from the server.
    #[error("http error: {0}")]
    Http(StatusCode),
    /// An internal SDK error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_display() {
        let err = Error::InvalidCredentials("API key is required".to_string());
        assert_eq!(err.to_string(), "invalid credentials: API key is required");
    }

    #[test]
    fn connection_failed_display() {
        let err = Error::ConnectionFailed("Connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "realtime connection failed: Connection refused"
        );
    }

    #[test]
    fn auth_error_display() {
        let err = Error::Auth {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid login credentials".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "auth error (400 Bad Request): Invalid login credentials"
        );
    }
}
