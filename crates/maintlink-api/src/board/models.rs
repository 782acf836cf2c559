// Wire types for the board controller service.
//
// Every command endpoint answers with the same loose envelope:
// `{ "status": "success" | "error", "message": "...", ...extra }`.
// Extra fields are captured so nothing the service sends is dropped.

use serde::{Deserialize, Serialize};

// ── Board ────────────────────────────────────────────────────────────

/// A command path on the service, one per physical controller board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Board {
    Sensor,
    Motor,
    System,
}

impl Board {
    /// URL path segment the service mounts this board's router under.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Motor => "motor",
            Self::System => "sistem",
        }
    }
}

// ── Command reply ────────────────────────────────────────────────────

/// Reply envelope returned by command endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardReply {
    /// `"success"` or `"error"`.
    pub status: String,

    /// Human-readable message, if present.
    #[serde(default)]
    pub message: Option<String>,

    /// Optional payload some commands attach.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl BoardReply {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ── Ping reply ───────────────────────────────────────────────────────

/// Reply from `POST /{board}/ping`.
///
/// A board can be reachable but report itself unhealthy, so `healthy`
/// is tracked separately from `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReply {
    pub status: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(rename = "saglikli", default)]
    pub healthy: bool,
}

// ── System status ────────────────────────────────────────────────────

/// Reply from `GET /sistem/durum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub status: Option<String>,

    /// Current machine state, e.g. `"bakim"`, `"oturum_yok"`, `"bilinmiyor"`.
    #[serde(rename = "durum")]
    pub state: String,

    #[serde(rename = "motor_baglanti", default)]
    pub motor_connected: bool,

    #[serde(rename = "sensor_baglanti", default)]
    pub sensor_connected: bool,

    #[serde(rename = "mesaj", default)]
    pub note: Option<String>,
}

impl SystemStatus {
    /// State value the service reports while maintenance mode is on.
    pub const MAINTENANCE_STATE: &'static str = "bakim";

    pub fn is_maintenance(&self) -> bool {
        self.state == Self::MAINTENANCE_STATE
    }
}

/// Body of `POST /bakim/modu-ayarla`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MaintenanceModeRequest {
    #[serde(rename = "aktif")]
    pub active: bool,
}

/// FastAPI-style error body (`HTTPException`).
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}
