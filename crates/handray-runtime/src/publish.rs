//! JSON-lines output of selection signals.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use handray_core::{ConnectionState, SelectionSignal};
use serde::Serialize;

/// One line of output: the selection signal plus stream health.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedSignal {
    #[serde(flatten)]
    pub signal: SelectionSignal,
    pub connection_state: ConnectionState,
    pub frame_count: u64,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct SignalWriter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> SignalWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Write one signal as a single line and flush.
    pub fn publish(&mut self, signal: &PublishedSignal) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, signal)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }
}
