//! WebSocket event feed transport.
//!
//! Opens the maintenance event feed (`/api/v1/ws/bakim`) and yields raw
//! text frames. This layer deliberately has no reconnect loop and no
//! decoding: the console's stream client owns reconnect policy (it must
//! stop reconnecting the moment maintenance mode ends) and the typed event
//! model, so all this module does is connect, read, and close.
//!
//! # Example
//!
//! ```rust,ignore
//! use maintlink_api::websocket::WebSocketFeed;
//! use url::Url;
//!
//! let feed = WebSocketFeed::new(Url::parse("ws://localhost:4321/api/v1/ws/bakim")?);
//! let mut conn = feed.open().await?;
//!
//! while let Some(frame) = conn.next_text().await {
//!     println!("{}", frame?);
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

/// Feed path relative to the API root.
pub const MAINTENANCE_FEED_PATH: &str = "ws/bakim";

// ── WebSocketFeed ────────────────────────────────────────────────────

/// Connection factory for the event feed.
#[derive(Debug, Clone)]
pub struct WebSocketFeed {
    url: Url,
}

impl WebSocketFeed {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Derive the feed URL from an HTTP API root.
    ///
    /// `http://host:4321/api/v1` becomes `ws://host:4321/api/v1/ws/bakim`,
    /// `https` maps to `wss`.
    pub fn from_api_base(base: &Url) -> Result<Self, Error> {
        let mut url = base.clone();
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot derive ws url from {base}")))?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/{MAINTENANCE_FEED_PATH}"));
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Perform the WebSocket handshake.
    pub async fn open(&self) -> Result<FeedConnection, Error> {
        tracing::info!(url = %self.url, "Connecting to event feed");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("Event feed connected");
        Ok(FeedConnection { ws: ws_stream })
    }
}

// ── FeedConnection ───────────────────────────────────────────────────

/// One live feed connection. Owned by exactly one reader.
pub struct FeedConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FeedConnection {
    /// Next text frame.
    ///
    /// `None` means the server closed cleanly (close frame or end of
    /// stream). Ping/pong and binary frames are skipped.
    pub async fn next_text(&mut self) -> Option<Result<String, Error>> {
        loop {
            match self.ws.next().await? {
                Ok(tungstenite::Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(tungstenite::Message::Ping(_)) => {
                    // tungstenite queues the pong automatically
                    tracing::trace!("Event feed ping");
                }
                Ok(tungstenite::Message::Close(frame)) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "Event feed close frame received"
                        );
                    } else {
                        tracing::info!("Event feed close frame received (no payload)");
                    }
                    return None;
                }
                Ok(_) => {
                    // Binary, Pong, Frame -- ignore
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => {
                    return Some(Err(Error::WebSocketClosed {
                        code: 1006,
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }

    /// Send a close frame. Errors are logged, never returned.
    pub async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "Event feed close failed (already gone)");
        }
        let _ = self.ws.flush().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
