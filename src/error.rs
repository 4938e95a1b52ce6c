//! Error types for the WebSocket core

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Malformed input from the peer, or an outbound frame that breaks RFC 6455
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("reserved bits set in frame header (0x{0:02x})")]
    ReservedBitsSet(u8),

    #[error("unknown opcode 0x{0:x}")]
    UnknownOpcode(u8),

    #[error("control frame payload of {0} bytes exceeds 125 bytes")]
    ControlFrameTooLarge(u64),

    #[error("control frames must not be fragmented")]
    FragmentedControlFrame,

    #[error("frame payload of {size} bytes exceeds configured limit of {limit} bytes")]
    FrameTooLarge { size: u64, limit: u64 },

    #[error("64-bit payload length has its most significant bit set")]
    InvalidLength,

    #[error("malformed close frame payload")]
    InvalidClosePayload,

    #[error("close reason message of {0} bytes does not fit in a control frame")]
    CloseReasonTooLong(usize),
}

#[derive(Debug, Error)]
pub enum WebSocketError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The byte source ended in the middle of a frame
    #[error("transport closed in the middle of a frame")]
    TransportClosed,

    #[error("close handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("websocket session is closed")]
    SessionClosed,

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}
