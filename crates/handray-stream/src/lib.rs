//! handray-stream: landmark stream IO boundary.
//! Keeps a WebSocket connection to the hand-tracking service alive, decodes
//! frames and reports connection health. Reconnect timing goes through the
//! caller's [`handray_core::Scheduler`]; no background tasks are spawned.

pub mod client;
pub mod error;

pub use client::{
    DEFAULT_ENDPOINT, FrameUpdate, LandmarkClient, OpenedSocket, SocketEvent, StatusUpdate,
    StreamConfig, StreamEvent,
};
pub use error::StreamError;
