//! WebSocket frame models
//!
//! Represents decoded frames as delivered to the application and as queued
//! for sending.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolViolation;
use crate::models::CloseReason;
use crate::pool::PooledBuffer;

/// Largest payload a control frame may carry
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    /// Continuation frame
    Continuation,
    /// Text frame (UTF-8 encoded)
    Text,
    /// Binary frame
    Binary,
    /// Connection close frame
    Close,
    /// Ping frame
    Ping,
    /// Pong frame
    Pong,
}

impl FrameType {
    /// Parse from the 4-bit opcode field
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x0 => Some(FrameType::Continuation),
            0x1 => Some(FrameType::Text),
            0x2 => Some(FrameType::Binary),
            0x8 => Some(FrameType::Close),
            0x9 => Some(FrameType::Ping),
            0xA => Some(FrameType::Pong),
            _ => None,
        }
    }

    pub fn opcode(self) -> u8 {
        match self {
            FrameType::Continuation => 0x0,
            FrameType::Text => 0x1,
            FrameType::Binary => 0x2,
            FrameType::Close => 0x8,
            FrameType::Ping => 0x9,
            FrameType::Pong => 0xA,
        }
    }

    /// Close, ping and pong
    pub fn is_control(self) -> bool {
        matches!(self, FrameType::Close | FrameType::Ping | FrameType::Pong)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Continuation => "CONTINUATION",
            FrameType::Text => "TEXT",
            FrameType::Binary => "BINARY",
            FrameType::Close => "CLOSE",
            FrameType::Ping => "PING",
            FrameType::Pong => "PONG",
        }
    }
}

/// A single WebSocket frame
///
/// The payload is always stored unmasked. Frames decoded off the wire own a
/// pooled buffer that goes back to the pool when the frame is dropped;
/// cloning produces an unpooled copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    fin: bool,
    payload: PooledBuffer,
}

impl Frame {
    pub fn new(frame_type: FrameType, fin: bool, payload: impl Into<Vec<u8>>) -> Self {
        Self::from_parts(frame_type, fin, PooledBuffer::unpooled(payload.into()))
    }

    pub(crate) fn from_parts(frame_type: FrameType, fin: bool, payload: PooledBuffer) -> Self {
        Self {
            frame_type,
            fin,
            payload,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(FrameType::Text, true, text.into().into_bytes())
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameType::Binary, true, payload)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameType::Ping, true, payload)
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameType::Pong, true, payload)
    }

    /// Close frame carrying `reason`
    pub fn close(reason: &CloseReason) -> Self {
        Self::new(FrameType::Close, true, reason.encode())
    }

    /// Close frame with no status code
    pub fn close_empty() -> Self {
        Self::new(FrameType::Close, true, Vec::new())
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn fin(&self) -> bool {
        self.fin
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_control(&self) -> bool {
        self.frame_type.is_control()
    }

    /// Hand over the payload buffer, keeping it attached to its pool
    pub fn into_payload(self) -> PooledBuffer {
        self.payload
    }

    /// Check the control-frame invariants before a frame goes on the wire
    pub fn validate(&self) -> Result<(), ProtocolViolation> {
        if self.is_control() {
            if !self.fin {
                return Err(ProtocolViolation::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolViolation::ControlFrameTooLarge(
                    self.payload.len() as u64,
                ));
            }
        }
        Ok(())
    }

    /// Decode the close reason of a close frame
    ///
    /// Returns `Ok(None)` for non-close frames and for close frames with an
    /// empty payload.
    pub fn read_reason(&self) -> Result<Option<CloseReason>, ProtocolViolation> {
        if self.frame_type != FrameType::Close {
            return Ok(None);
        }
        CloseReason::parse(&self.payload)
    }

    /// Get payload as UTF-8 string (for text frames)
    pub fn payload_as_string(&self) -> Option<String> {
        if self.frame_type == FrameType::Text {
            String::from_utf8(self.payload.to_vec()).ok()
        } else {
            None
        }
    }

    /// Get a preview of the payload (first 100 chars/bytes)
    pub fn payload_preview(&self) -> String {
        let len = self.payload.len();
        match self.frame_type {
            FrameType::Text => match std::str::from_utf8(&self.payload) {
                Ok(text) if text.chars().count() > 100 => {
                    let cut: String = text.chars().take(100).collect();
                    format!("{}...", cut)
                }
                Ok(text) => text.to_string(),
                Err(_) => format!("[Binary: {} bytes]", len),
            },
            FrameType::Binary => format!("[Binary: {} bytes]", len),
            FrameType::Close => match self.read_reason() {
                Ok(Some(reason)) => format!("Close: {}", reason),
                Ok(None) => "Close".to_string(),
                Err(_) => format!("Close: [malformed, {} bytes]", len),
            },
            FrameType::Ping => "Ping".to_string(),
            FrameType::Pong => "Pong".to_string(),
            FrameType::Continuation => format!("[Continuation: {} bytes]", len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_map_both_ways() {
        for opcode in [0x0, 0x1, 0x2, 0x8, 0x9, 0xA] {
            let frame_type = FrameType::from_opcode(opcode).unwrap();
            assert_eq!(frame_type.opcode(), opcode);
        }
        assert_eq!(FrameType::from_opcode(0x3), None);
        assert_eq!(FrameType::from_opcode(0xB), None);
    }

    #[test]
    fn control_frames_are_classified() {
        assert!(FrameType::Close.is_control());
        assert!(FrameType::Ping.is_control());
        assert!(FrameType::Pong.is_control());
        assert!(!FrameType::Text.is_control());
        assert!(!FrameType::Continuation.is_control());
    }

    #[test]
    fn validate_rejects_oversized_ping() {
        let frame = Frame::ping(vec![0u8; 126]);
        assert_eq!(
            frame.validate(),
            Err(ProtocolViolation::ControlFrameTooLarge(126))
        );
        assert!(Frame::ping(vec![0u8; 125]).validate().is_ok());
    }

    #[test]
    fn validate_rejects_fragmented_control_frame() {
        let frame = Frame::new(FrameType::Pong, false, Vec::new());
        assert_eq!(
            frame.validate(),
            Err(ProtocolViolation::FragmentedControlFrame)
        );
        assert!(Frame::new(FrameType::Text, false, vec![0u8; 500])
            .validate()
            .is_ok());
    }

    #[test]
    fn close_frame_reason_is_readable() {
        let reason = CloseReason::new(1001, "bye").unwrap();
        let frame = Frame::close(&reason);
        assert_eq!(frame.read_reason().unwrap(), Some(reason));
        assert_eq!(Frame::close_empty().read_reason().unwrap(), None);
        assert_eq!(Frame::text("x").read_reason().unwrap(), None);
    }

    #[test]
    fn preview_truncates_long_text() {
        let frame = Frame::text("a".repeat(150));
        let preview = frame.payload_preview();
        assert_eq!(preview.len(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn preview_describes_close_frames() {
        let frame = Frame::close(&CloseReason::new(1000, "done").unwrap());
        assert_eq!(frame.payload_preview(), "Close: 1000 done");
        assert_eq!(Frame::close_empty().payload_preview(), "Close");
    }
}
