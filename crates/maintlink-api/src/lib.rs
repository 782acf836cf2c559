// maintlink-api: Async client for the RVM board controller service (HTTP commands + event feed)

pub mod board;
pub mod error;
pub mod transport;
pub mod websocket;

pub use board::{Board, BoardClient, BoardReply, PingReply, SystemStatus};
pub use error::Error;
pub use transport::TransportConfig;
pub use websocket::{FeedConnection, WebSocketFeed};
