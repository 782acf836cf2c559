// Board service HTTP client
//
// Wraps `reqwest::Client` with URL construction and reply decoding for the
// board controller service. Every board exposes the same shape of endpoint
// (`POST /{board}/{command}`), so a single `invoke` covers the whole command
// catalogue; the caller decides which commands exist.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::models::{Board, BoardReply, ErrorDetail, MaintenanceModeRequest, PingReply, SystemStatus};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Async client for the board controller service.
///
/// `base_url` is the API root, e.g. `http://localhost:4321/api/v1`.
#[derive(Debug, Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BoardClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client with its own `reqwest::Client` from `transport`.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Ensure the base path ends with `/` so relative joins append.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    /// The API root all paths are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Board commands ───────────────────────────────────────────────

    /// Send `command` to `board`: `POST {base}/{board}/{command}`.
    ///
    /// A reply with `"status": "error"` is returned as-is; only transport
    /// failures and non-2xx statuses become `Err`.
    pub async fn invoke(
        &self,
        board: Board,
        command: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<BoardReply, Error> {
        let path = format!("{}/{}", board.path_segment(), command.trim_matches('/'));
        match payload {
            Some(body) => self.post(&path, body).await,
            None => self.post_empty(&path).await,
        }
    }

    /// Liveness probe: `POST {base}/{board}/ping`.
    pub async fn ping(&self, board: Board) -> Result<PingReply, Error> {
        let path = format!("{}/ping", board.path_segment());
        self.post_empty(&path).await
    }

    // ── System ───────────────────────────────────────────────────────

    /// Current machine state: `GET {base}/sistem/durum`.
    pub async fn system_status(&self) -> Result<SystemStatus, Error> {
        self.get("sistem/durum").await
    }

    /// Switch maintenance mode on or off: `POST {base}/bakim/modu-ayarla`.
    pub async fn set_maintenance_mode(&self, active: bool) -> Result<BoardReply, Error> {
        self.post("bakim/modu-ayarla", &MaintenanceModeRequest { active })
            .await
    }

    /// Raw read of any JSON resource under the API root.
    pub async fn fetch(&self, path: &str) -> Result<serde_json::Value, Error> {
        self.get(path).await
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        Self::handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).send().await?;
        Self::handle_response(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorDetail>(&raw)
            .ok()
            .and_then(|err| match err.detail {
                Some(serde_json::Value::String(s)) => Some(s),
                Some(other) => Some(other.to_string()),
                None => err.message,
            })
            .unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                }
            });

        Error::Board {
            status: status.as_u16(),
            message,
        }
    }
}
