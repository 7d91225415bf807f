//! Client for the realtime event service.
//!
//! Holds at most one WebSocket connection, kept as split halves: the write
//! half lives in the slot that `connect` serializes on, the read half in its
//! own slot so a reader parked in `next_message` never blocks reconnection.
//! Replacing the connection bumps a generation counter that wakes the parked
//! reader, which observes the replacement as end-of-stream. There is no
//! automatic retry; the facade drives reconnection.

use crate::{error::Error, headers::SharedHeaders};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use http::Request;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONNECTION, UPGRADE};
use std::sync::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        handshake::client::generate_key,
        protocol::{Message, WebSocketConfig},
    },
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

pub use tokio_tungstenite::tungstenite::protocol::Message as RealtimeMessage;

/// The maximum size of a message in bytes (10MB).
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The read half of one connection, tagged with the generation that
/// installed it so a reader can tell a stale half from a live one.
struct ReadHalf {
    generation: u64,
    stream: SplitStream<WsStream>,
}

/// Client for the realtime event service.
pub struct RealtimeClient {
    base_url: String,
    headers: SharedHeaders,
    token: RwLock<String>,
    write: Mutex<Option<SplitSink<WsStream, Message>>>,
    read: Mutex<Option<ReadHalf>>,
    /// Bumped on every connection replacement to wake parked readers.
    generation: watch::Sender<u64>,
}

impl RealtimeClient {
    pub(crate) fn new(base_url: String, headers: SharedHeaders, token: String) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            base_url,
            headers,
            token: RwLock::new(token),
            write: Mutex::new(None),
            read: Mutex::new(None),
            generation,
        }
    }

    /// Returns a snapshot of the headers this client sends.
    pub fn headers(&self) -> HeaderMap {
        self.headers.snapshot()
    }

    /// Replaces the access token used by the next connect.
    pub fn set_auth(&self, token: impl Into<String>) {
        *self.token.write().expect("token lock poisoned") = token.into();
    }

    /// Whether a connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.write.lock().await.is_some()
    }

    /// (Re)establishes the WebSocket connection with the current token.
    ///
    /// Any previous connection is closed first; a reader parked in
    /// [`next_message`](Self::next_message) is woken and observes
    /// end-of-stream, so the replacement never waits for a frame to arrive.
    /// On failure both slots are left empty and a later call may retry.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut write = self.write.lock().await;
        if let Some(previous) = write.take() {
            // Best effort; the server may already have dropped it.
            let _ = close_sink(previous).await;
        }

        let mut next_generation = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            next_generation = *generation;
        });
        *self.read.lock().await = None;

        let request = self.connect_request()?;
        let (ws_stream, _) = connect_async_with_config(
            request,
            Some(WebSocketConfig {
                max_message_size: Some(MAX_MESSAGE_SIZE),
                max_frame_size: Some(MAX_MESSAGE_SIZE),
                ..Default::default()
            }),
            false,
        )
        .await
        .map_err(|err| Error::ConnectionFailed(err.to_string()))?;

        let (write_half, read_half) = ws_stream.split();
        *self.read.lock().await = Some(ReadHalf {
            generation: next_generation,
            stream: read_half,
        });
        *write = Some(write_half);
        Ok(())
    }

    /// Closes the connection, if one is held.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let mut write = self.write.lock().await;
        self.generation.send_modify(|generation| *generation += 1);
        *self.read.lock().await = None;
        if let Some(sink) = write.take() {
            close_sink(sink).await?;
        }
        Ok(())
    }

    /// Waits for the next event frame on the open connection.
    ///
    /// Returns `Ok(None)` when the server closes the stream or when the
    /// connection is replaced underneath the reader. Only the read half is
    /// held while waiting, so `connect` and `disconnect` stay available.
    pub async fn next_message(&self) -> Result<Option<Message>, Error> {
        let mut read = self.read.lock().await;
        let mut generation = self.generation.subscribe();

        let half = match read.as_mut() {
            Some(half) => half,
            None => return Err(Error::ConnectionFailed("not connected".to_string())),
        };
        // A replacement published before we subscribed leaves a stale half
        // behind; treat it as end-of-stream rather than reading from it.
        if half.generation != *generation.borrow() {
            *read = None;
            return Ok(None);
        }

        let mut replaced = false;
        let frame = tokio::select! {
            frame = half.stream.next() => frame,
            _ = generation.changed() => {
                replaced = true;
                None
            }
        };
        if replaced {
            *read = None;
            return Ok(None);
        }
        match frame {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => Err(Error::WebSocket(err)),
            None => Ok(None),
        }
    }

    fn connect_request(&self) -> Result<Request<()>, Error> {
        let token = self.token.read().expect("token lock poisoned").clone();
        let mut url = Url::parse(&format!("{}/websocket", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("apikey", &token)
            .append_pair("vsn", "1.0.0");

        let host = url
            .host_str()
            .ok_or_else(|| Error::Internal("invalid realtime URL: missing host".to_string()))?
            .to_string();

        let headers = self.headers.snapshot();
        let mut request = Request::builder()
            .method("GET")
            .uri(url.as_str())
            .version(http::Version::HTTP_11)
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Host", host);
        if let Some(authorization) = headers.get(AUTHORIZATION) {
            request = request.header(AUTHORIZATION, authorization.clone());
        }

        request
            .body(())
            .map_err(|err| Error::Internal(err.to_string()))
    }
}

async fn close_sink(mut sink: SplitSink<WsStream, Message>) -> Result<(), Error> {
    sink.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client() -> RealtimeClient {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_static("Bearer anon"));
        RealtimeClient::new(
            "ws://localhost:4000/realtime/v1".to_string(),
            SharedHeaders::new(map),
            "anon".to_string(),
        )
    }

    #[test]
    fn connect_request_carries_token_and_headers() {
        let client = client();
        let request = client.connect_request().unwrap();
        assert!(request
            .uri()
            .query()
            .unwrap()
            .contains("apikey=anon"));
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer anon"
        );
        assert_eq!(request.headers().get(UPGRADE).unwrap(), "websocket");
    }

    #[test]
    fn set_auth_changes_next_request() {
        let client = client();
        client.set_auth("rotated");
        let request = client.connect_request().unwrap();
        assert!(request.uri().query().unwrap().contains("apikey=rotated"));
    }

    #[test]
    fn token_is_percent_encoded_in_the_connect_url() {
        let client = client();
        client.set_auth("tok&en#1");
        let request = client.connect_request().unwrap();
        let query = request.uri().query().unwrap();
        assert!(query.contains("apikey=tok%26en%231"), "query: {query}");
        assert!(!query.contains("tok&en"));
    }
}
