//! Wire format of the tracking service.
//!
//! Each text message is either
//! `{"landmarks": [{x,y,z} × 21] | null, "frame_count": n, "timestamp"?: t}`
//! or `{"error": "..."}`. Both shapes may appear on any message.

use serde::Deserialize;

use crate::error::ProtocolError;
use crate::types::{Landmark, LandmarkFrame};

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    landmarks: Option<Vec<Landmark>>,
    #[serde(default)]
    frame_count: Option<u64>,
    #[serde(default)]
    timestamp: Option<f64>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A tracking frame. `frame` is `None` when no hand was detected.
    Frame {
        frame: Option<LandmarkFrame>,
        frame_count: u64,
    },
    /// The service reported a problem (e.g. camera unavailable).
    ServerError(String),
}

/// Decode one text message.
///
/// An empty `error` string is treated as absent.
pub fn decode_message(text: &str) -> Result<Inbound, ProtocolError> {
    let wire: WireMessage = serde_json::from_str(text)?;

    if let Some(error) = wire.error.filter(|e| !e.is_empty()) {
        return Ok(Inbound::ServerError(error));
    }

    let frame_count = wire.frame_count.unwrap_or(0);
    let frame = wire
        .landmarks
        .map(|lms| LandmarkFrame::new(lms, frame_count, wire.timestamp))
        .transpose()?;

    Ok(Inbound::Frame { frame, frame_count })
}
