//! Session configuration

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::websocket::transport::DEFAULT_CHUNK_SIZE;

/// Largest accepted `max_frame_size` (1 GiB)
pub const MAX_FRAME_SIZE_LIMIT: u64 = 1 << 30;

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Mask outgoing frames (client endpoints)
    pub masking: bool,
    /// Upper bound on the whole close handshake
    pub close_timeout_ms: u64,
    /// Largest payload accepted from the peer
    pub max_frame_size: u64,
    /// Read size for tokio readers
    ///
    /// Applied by [`crate::WebSocketSession::start_io`]. Callers building
    /// their own [`crate::websocket::IoSource`] pass it to `IoSource::new`.
    pub read_chunk_size: usize,
    /// Frames buffered for the application before the reader waits
    pub incoming_capacity: usize,
    /// Frames buffered for the writer before senders wait
    pub outgoing_capacity: usize,
    /// Answer pings with a pong carrying the same payload
    pub auto_pong: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            masking: false,
            close_timeout_ms: 15_000,
            max_frame_size: 16 * 1024 * 1024,
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            incoming_capacity: 32,
            outgoing_capacity: 32,
            auto_pong: true,
        }
    }
}

impl WebSocketConfig {
    /// Configuration for the client side of a connection
    pub fn client() -> Self {
        Self {
            masking: true,
            ..Self::default()
        }
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Invalid WebSocket config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Failed to load {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.close_timeout_ms == 0 {
            bail!("close_timeout_ms must be greater than zero");
        }
        if self.max_frame_size == 0 {
            bail!("max_frame_size must be greater than zero");
        }
        if self.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            bail!(
                "max_frame_size {} exceeds the limit of {} bytes",
                self.max_frame_size,
                MAX_FRAME_SIZE_LIMIT
            );
        }
        if self.read_chunk_size == 0 {
            bail!("read_chunk_size must be greater than zero");
        }
        if self.incoming_capacity == 0 || self.outgoing_capacity == 0 {
            bail!("channel capacities must be greater than zero");
        }
        Ok(())
    }
}
