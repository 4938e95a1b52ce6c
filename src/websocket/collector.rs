//! Frame payload collection
//!
//! Gathers one frame's payload across chunks and unmasks it as it arrives.

use bytes::Buf;

use crate::pool::{PooledBuffer, SharedPool};
use crate::websocket::mask::apply_mask;
use crate::websocket::parser::FrameHeader;

/// Most buffer capacity requested before any payload byte has arrived
pub const MAX_INITIAL_CAPACITY: usize = 64 * 1024;

/// Accumulates exactly one frame's payload
///
/// A collector is created per frame and consumed by [`PayloadCollector::take`],
/// so the mask offset never carries over between frames.
#[derive(Debug)]
pub struct PayloadCollector {
    buffer: PooledBuffer,
    length: usize,
    mask_key: Option<[u8; 4]>,
}

impl PayloadCollector {
    pub fn new(length: usize, mask_key: Option<[u8; 4]>, pool: &SharedPool) -> Self {
        Self {
            buffer: PooledBuffer::acquire(pool, length.min(MAX_INITIAL_CAPACITY)),
            length,
            mask_key,
        }
    }

    /// Collector sized for the payload announced by `header`
    ///
    /// The parser has already checked the length against the frame size
    /// limit, so it fits in memory on this platform unless the limit itself
    /// was configured past `usize::MAX`.
    pub fn for_header(header: &FrameHeader, pool: &SharedPool) -> Option<Self> {
        let length = usize::try_from(header.length).ok()?;
        Some(Self::new(length, header.mask_key, pool))
    }

    /// Copy as much of the payload as `input` holds, advancing it
    ///
    /// Returns the number of bytes consumed. Bytes beyond this frame's
    /// payload are left in `input`.
    pub fn consume(&mut self, input: &mut &[u8]) -> usize {
        let take = self.remaining().min(input.remaining());
        if take == 0 {
            return 0;
        }

        let offset = self.buffer.len();
        self.buffer.reserve_within(take, self.length);
        self.buffer.extend_from_slice(&input[..take]);
        input.advance(take);

        if let Some(key) = self.mask_key {
            apply_mask(&mut self.buffer.as_mut_slice()[offset..], key, offset);
        }
        take
    }

    pub fn remaining(&self) -> usize {
        self.length - self.buffer.len()
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Hand over the completed, unmasked payload
    pub fn take(self) -> PooledBuffer {
        debug_assert!(!self.has_remaining(), "payload taken before completion");
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{NoPool, RecyclingPool};
    use crate::websocket::parser::FrameParser;
    use std::sync::Arc;

    const MASKED_HELLO: [u8; 11] = [
        0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
    ];

    fn no_pool() -> SharedPool {
        Arc::new(NoPool)
    }

    #[test]
    fn collects_masked_payload_in_one_chunk() {
        let mut parser = FrameParser::default();
        let mut input: &[u8] = &MASKED_HELLO;
        let header = parser.frame(&mut input).unwrap().unwrap();

        let mut collector = PayloadCollector::for_header(&header, &no_pool()).unwrap();
        collector.consume(&mut input);

        assert!(!collector.has_remaining());
        assert_eq!(&collector.take()[..], b"Hello");
    }

    #[test]
    fn mask_offset_continues_across_chunks() {
        let (first, second) = MASKED_HELLO.split_at(6);
        let mut parser = FrameParser::default();

        let mut input = first;
        let header = parser.frame(&mut input).unwrap().unwrap();
        assert!(input.is_empty());

        let mut collector = PayloadCollector::for_header(&header, &no_pool()).unwrap();
        assert_eq!(collector.consume(&mut input), 0);
        assert!(collector.has_remaining());

        let mut input = second;
        assert_eq!(collector.consume(&mut input), 5);
        assert!(!collector.has_remaining());
        assert_eq!(&collector.take()[..], b"Hello");
    }

    #[test]
    fn mask_offset_survives_odd_splits() {
        let mut payload = b"chunk boundaries".to_vec();
        let key = [0x11, 0x22, 0x33, 0x44];
        crate::websocket::mask::apply_mask(&mut payload, key, 0);

        let mut collector = PayloadCollector::new(payload.len(), Some(key), &no_pool());
        for piece in payload.chunks(3) {
            let mut input = piece;
            collector.consume(&mut input);
        }
        assert_eq!(&collector.take()[..], b"chunk boundaries");
    }

    #[test]
    fn large_payload_grows_as_it_arrives() {
        let length = 3 * MAX_INITIAL_CAPACITY + 17;
        let mut payload: Vec<u8> = (0..length).map(|i| (i % 251) as u8).collect();
        let key = [0x0f, 0xf0, 0x55, 0xaa];
        let expected = payload.clone();
        crate::websocket::mask::apply_mask(&mut payload, key, 0);

        let mut collector = PayloadCollector::new(length, Some(key), &no_pool());
        for piece in payload.chunks(10_007) {
            let mut input = piece;
            assert_eq!(collector.consume(&mut input), piece.len());
        }
        assert_eq!(&collector.take()[..], &expected[..]);
    }

    #[test]
    fn leaves_following_frame_bytes_in_input() {
        let pool = no_pool();
        let mut collector = PayloadCollector::new(3, None, &pool);
        let mut input: &[u8] = &[1, 2, 3, 0x89, 0x00];

        assert_eq!(collector.consume(&mut input), 3);
        assert_eq!(input, &[0x89, 0x00]);
        assert_eq!(&collector.take()[..], &[1, 2, 3]);
    }

    #[test]
    fn zero_length_payload_is_immediately_complete() {
        let collector = PayloadCollector::new(0, Some([1, 2, 3, 4]), &no_pool());
        assert!(!collector.has_remaining());
        assert!(collector.take().is_empty());
    }

    #[test]
    fn abandoned_collector_returns_buffer_to_pool() {
        let recycling = Arc::new(RecyclingPool::new(4, 1024));
        let pool: SharedPool = recycling.clone();

        let mut collector = PayloadCollector::new(10, None, &pool);
        let mut input: &[u8] = &[0u8; 4];
        collector.consume(&mut input);
        assert_eq!(recycling.outstanding(), 1);

        drop(collector);
        assert_eq!(recycling.outstanding(), 0);
    }
}
