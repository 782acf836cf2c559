// Board controller service client modules
//
// Request/response access to the sensor, motor and system boards plus the
// handful of system-level endpoints the console needs (status, mode switch).

pub mod client;
pub mod models;

pub use client::BoardClient;
pub use models::{Board, BoardReply, PingReply, SystemStatus};
