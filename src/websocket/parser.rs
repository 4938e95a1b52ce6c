//! WebSocket frame header parsing
//!
//! Parses frame headers according to RFC 6455, resuming across however many
//! chunks the header happens to be split over.

use bytes::Buf;

use crate::error::ProtocolViolation;
use crate::models::{FrameType, MAX_CONTROL_PAYLOAD};

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LENGTH_BITS: u8 = 0x7F;

/// 7-bit length value announcing a 16-bit extended length
pub const LENGTH_16: u8 = 126;
/// 7-bit length value announcing a 64-bit extended length
pub const LENGTH_64: u8 = 127;

/// Parsed WebSocket frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub fin: bool,
    pub masked: bool,
    /// Payload length after resolving any extended length field
    pub length: u64,
    pub mask_key: Option<[u8; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingOpcodeByte,
    AwaitingLengthByte,
    AwaitingExtendedLength { width: usize },
    AwaitingMaskKey,
    HeaderReady,
}

/// Incremental frame header parser
///
/// Holds only what it needs to resume: the fields decoded so far and the
/// bytes of a multi-byte field that was cut by a chunk boundary.
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: State,
    max_frame_size: u64,
    frame_type: FrameType,
    fin: bool,
    masked: bool,
    length: u64,
    mask_key: [u8; 4],
    partial: [u8; 8],
    filled: usize,
}

impl FrameParser {
    pub fn new(max_frame_size: u64) -> Self {
        Self {
            state: State::AwaitingOpcodeByte,
            max_frame_size,
            frame_type: FrameType::Continuation,
            fin: false,
            masked: false,
            length: 0,
            mask_key: [0; 4],
            partial: [0; 8],
            filled: 0,
        }
    }

    /// Consume header bytes from `input`
    ///
    /// Advances `input` past every byte it used and returns the header once
    /// it is complete. Bytes following a complete header are left untouched
    /// for the payload collector. Returns `Ok(None)` when `input` ran dry
    /// first.
    pub fn frame(
        &mut self,
        input: &mut &[u8],
    ) -> Result<Option<FrameHeader>, ProtocolViolation> {
        loop {
            match self.state {
                State::AwaitingOpcodeByte => {
                    if !input.has_remaining() {
                        return Ok(None);
                    }
                    let byte = input.get_u8();

                    if byte & RSV_BITS != 0 {
                        return Err(ProtocolViolation::ReservedBitsSet(byte & RSV_BITS));
                    }
                    let opcode = byte & OPCODE_BITS;
                    self.frame_type = FrameType::from_opcode(opcode)
                        .ok_or(ProtocolViolation::UnknownOpcode(opcode))?;
                    self.fin = byte & FIN_BIT != 0;

                    if self.frame_type.is_control() && !self.fin {
                        return Err(ProtocolViolation::FragmentedControlFrame);
                    }
                    self.state = State::AwaitingLengthByte;
                }
                State::AwaitingLengthByte => {
                    if !input.has_remaining() {
                        return Ok(None);
                    }
                    let byte = input.get_u8();
                    self.masked = byte & MASK_BIT != 0;

                    match byte & LENGTH_BITS {
                        LENGTH_16 => self.state = State::AwaitingExtendedLength { width: 2 },
                        LENGTH_64 => self.state = State::AwaitingExtendedLength { width: 8 },
                        len => self.set_length(u64::from(len))?,
                    }
                }
                State::AwaitingExtendedLength { width } => {
                    if !self.fill(input, width) {
                        return Ok(None);
                    }
                    let length = if width == 2 {
                        u64::from(u16::from_be_bytes([self.partial[0], self.partial[1]]))
                    } else {
                        u64::from_be_bytes(self.partial)
                    };
                    self.filled = 0;

                    if length >> 63 != 0 {
                        return Err(ProtocolViolation::InvalidLength);
                    }
                    self.set_length(length)?;
                }
                State::AwaitingMaskKey => {
                    if !self.fill(input, 4) {
                        return Ok(None);
                    }
                    self.mask_key.copy_from_slice(&self.partial[..4]);
                    self.filled = 0;
                    self.state = State::HeaderReady;
                }
                State::HeaderReady => return Ok(self.header()),
            }
        }
    }

    /// The complete header, once one has been parsed
    pub fn header(&self) -> Option<FrameHeader> {
        if !self.is_ready() {
            return None;
        }
        Some(FrameHeader {
            frame_type: self.frame_type,
            fin: self.fin,
            masked: self.masked,
            length: self.length,
            mask_key: self.masked.then_some(self.mask_key),
        })
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state == State::HeaderReady
    }

    /// True between frames, before any byte of the next header was seen
    pub fn is_idle(&self) -> bool {
        self.state == State::AwaitingOpcodeByte
    }

    /// Start over for the next frame
    pub fn reset(&mut self) {
        *self = Self::new(self.max_frame_size);
    }

    fn set_length(&mut self, length: u64) -> Result<(), ProtocolViolation> {
        if self.frame_type.is_control() && length > MAX_CONTROL_PAYLOAD as u64 {
            return Err(ProtocolViolation::ControlFrameTooLarge(length));
        }
        if length > self.max_frame_size {
            return Err(ProtocolViolation::FrameTooLarge {
                size: length,
                limit: self.max_frame_size,
            });
        }
        self.length = length;
        self.state = if self.masked {
            State::AwaitingMaskKey
        } else {
            State::HeaderReady
        };
        Ok(())
    }

    /// Accumulate bytes of a `needed`-byte field, true once it is complete
    fn fill(&mut self, input: &mut &[u8], needed: usize) -> bool {
        let take = (needed - self.filled).min(input.remaining());
        input.copy_to_slice(&mut self.partial[self.filled..self.filled + take]);
        self.filled += take;
        self.filled == needed
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(u64::MAX >> 1)
    }
}
