//! Captured frame summaries
//!
//! Lightweight, serialisable view of a frame for logs and tooling.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{Frame, FrameType};

/// Summary of a single decoded frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSummary {
    /// Unique identifier for this frame
    pub id: String,

    /// Session the frame was read on
    pub connection_id: String,

    pub frame_type: FrameType,

    /// Whether this is the final frame in a message
    pub is_final: bool,

    /// Payload length in bytes
    pub payload_length: u64,

    /// Timestamp (unix millis) when the frame was captured
    pub timestamp: i64,

    pub preview: String,
}

impl FrameSummary {
    pub fn new(connection_id: &str, frame: &Frame) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.to_string(),
            frame_type: frame.frame_type(),
            is_final: frame.fin(),
            payload_length: frame.payload().len() as u64,
            timestamp: Utc::now().timestamp_millis(),
            preview: frame.payload_preview(),
        }
    }

    /// Get payload size as formatted string
    pub fn size_str(&self) -> String {
        let size = self.payload_length;
        if size < 1024 {
            format!("{}B", size)
        } else if size < 1024 * 1024 {
            format!("{:.1}KB", size as f64 / 1024.0)
        } else {
            format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
        }
    }
}
