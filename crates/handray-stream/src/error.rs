//! Error types for the landmark stream.

use thiserror::Error;

/// Connection-level failure. Always retried up to the attempt cap.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connecting to {endpoint} timed out after {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },
}
