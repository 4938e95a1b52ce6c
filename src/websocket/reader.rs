//! Inbound frame reader
//!
//! [`FrameDecoder`] turns arbitrarily chunked bytes into frames. The read
//! loop drives it from a [`ChunkSource`] and dispatches each frame: close
//! frames to the close handshake, everything else to the application.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{ProtocolViolation, WebSocketError};
use crate::models::{Frame, FrameType};
use crate::pool::SharedPool;
use crate::websocket::close::{CloseFrameEvent, CloseSequence};
use crate::websocket::collector::PayloadCollector;
use crate::websocket::parser::{FrameHeader, FrameParser};
use crate::websocket::transport::ChunkSource;
use crate::websocket::writer::OutboundHandle;

/// Resumable frame decoder: header parser plus the current payload collector
pub struct FrameDecoder {
    parser: FrameParser,
    pending: Option<(FrameHeader, PayloadCollector)>,
    pool: SharedPool,
}

impl FrameDecoder {
    pub fn new(pool: SharedPool, max_frame_size: u64) -> Self {
        Self {
            parser: FrameParser::new(max_frame_size),
            pending: None,
            pool,
        }
    }

    /// Decode the next complete frame from `input`
    ///
    /// Call repeatedly until it returns `Ok(None)`, which means `input` is
    /// exhausted and the partial state has been kept for the next chunk.
    pub fn decode(&mut self, input: &mut &[u8]) -> Result<Option<Frame>, ProtocolViolation> {
        loop {
            match self.pending.take() {
                Some((header, mut collector)) => {
                    collector.consume(input);
                    if collector.has_remaining() {
                        self.pending = Some((header, collector));
                        return Ok(None);
                    }
                    self.parser.reset();
                    return Ok(Some(Frame::from_parts(
                        header.frame_type,
                        header.fin,
                        collector.take(),
                    )));
                }
                None => {
                    let Some(header) = self.parser.frame(input)? else {
                        return Ok(None);
                    };
                    let collector = PayloadCollector::for_header(&header, &self.pool).ok_or(
                        ProtocolViolation::FrameTooLarge {
                            size: header.length,
                            limit: usize::MAX as u64,
                        },
                    )?;
                    self.pending = Some((header, collector));
                }
            }
        }
    }

    /// True if some bytes of an unfinished frame have been consumed
    pub fn is_mid_frame(&self) -> bool {
        self.pending.is_some() || !self.parser.is_idle()
    }
}

pub(crate) struct ReadContext {
    pub session_id: String,
    pub pool: SharedPool,
    pub max_frame_size: u64,
    pub auto_pong: bool,
    pub frames: mpsc::Sender<Result<Frame, WebSocketError>>,
    pub close: Arc<CloseSequence>,
    pub outbound: OutboundHandle,
}

pub(crate) async fn read_loop<S: ChunkSource>(mut source: S, ctx: ReadContext) {
    let mut decoder = FrameDecoder::new(Arc::clone(&ctx.pool), ctx.max_frame_size);

    match pump(&mut source, &mut decoder, &ctx).await {
        Ok(()) => tracing::debug!("WebSocket {}: peer closed the transport", ctx.session_id),
        Err(e) => {
            match &e {
                WebSocketError::Protocol(violation) => {
                    tracing::warn!("WebSocket {}: {}", ctx.session_id, violation)
                }
                other => tracing::debug!("WebSocket {}: read failed: {}", ctx.session_id, other),
            }
            let _ = ctx.frames.send(Err(e)).await;
        }
    }

    // No more close frames can arrive from the peer
    ctx.close.shutdown();
}

async fn pump<S: ChunkSource>(
    source: &mut S,
    decoder: &mut FrameDecoder,
    ctx: &ReadContext,
) -> Result<(), WebSocketError> {
    while let Some(chunk) = source.next_chunk().await? {
        let mut input = &chunk[..];
        while let Some(frame) = decoder.decode(&mut input)? {
            dispatch(frame, ctx).await;
        }
    }

    if decoder.is_mid_frame() {
        return Err(WebSocketError::TransportClosed);
    }
    Ok(())
}

async fn dispatch(frame: Frame, ctx: &ReadContext) {
    tracing::trace!(
        "WebSocket {}: received {} frame ({} bytes, fin={})",
        ctx.session_id,
        frame.frame_type().as_str(),
        frame.payload().len(),
        frame.fin()
    );

    match frame.frame_type() {
        FrameType::Close => {
            ctx.close.send(CloseFrameEvent::Received(frame)).await;
            return;
        }
        FrameType::Ping if ctx.auto_pong => {
            if let Err(e) = ctx.outbound.send(Frame::pong(frame.payload().to_vec())).await {
                tracing::debug!("WebSocket {}: could not answer ping: {}", ctx.session_id, e);
            }
        }
        _ => {}
    }

    // A dropped `Incoming` just means nobody is listening; keep reading so
    // the close handshake still sees the peer's close frame
    let _ = ctx.frames.send(Ok(frame)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{NoPool, RecyclingPool};
    use crate::websocket::collector::MAX_INITIAL_CAPACITY;
    use crate::websocket::serializer::serialize;

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(Arc::new(NoPool), 1 << 20)
    }

    fn decode_in_chunks(bytes: &[u8], chunk_size: usize) -> Vec<Frame> {
        let mut decoder = decoder();
        let mut frames = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            let mut input = chunk;
            while let Some(frame) = decoder.decode(&mut input).unwrap() {
                frames.push(frame);
            }
            assert!(input.is_empty());
        }
        assert!(!decoder.is_mid_frame());
        frames
    }

    #[test]
    fn decodes_unmasked_hello() {
        let frames = decode_in_chunks(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f], 64);
        assert_eq!(frames, vec![Frame::text("Hello")]);
    }

    #[test]
    fn masked_decode_is_independent_of_chunking() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let originals = vec![
            Frame::text("Hello"),
            Frame::binary((0..300u32).map(|i| i as u8).collect::<Vec<_>>()),
            Frame::ping(b"are you there".to_vec()),
            Frame::new(FrameType::Continuation, false, Vec::new()),
        ];
        let mut wire = Vec::new();
        for frame in &originals {
            wire.extend_from_slice(&serialize(frame, Some(key)));
        }

        // Chunk sizes 1..=13 put boundaries inside every header field
        for chunk_size in 1..=13 {
            assert_eq!(
                decode_in_chunks(&wire, chunk_size),
                originals,
                "chunk size {}",
                chunk_size
            );
        }
    }

    #[test]
    fn unmasked_frames_round_trip_bit_exact() {
        for len in [0usize, 1, 5, 124, 125] {
            let frame = Frame::binary(vec![0xA5; len]);
            let wire = serialize(&frame, None);
            let decoded = decode_in_chunks(&wire, 64);
            assert_eq!(decoded.len(), 1);
            assert_eq!(serialize(&decoded[0], None), wire);
        }
    }

    #[test]
    fn zero_length_frame_completes_at_end_of_chunk() {
        let mut decoder = decoder();
        let mut input: &[u8] = &[0x89, 0x00];
        assert_eq!(
            decoder.decode(&mut input).unwrap(),
            Some(Frame::ping(Vec::new()))
        );
        assert_eq!(decoder.decode(&mut input).unwrap(), None);
    }

    #[test]
    fn tracks_partial_frames() {
        let mut decoder = decoder();
        let mut input: &[u8] = &[0x81, 0x05, 0x48];
        assert_eq!(decoder.decode(&mut input).unwrap(), None);
        assert!(decoder.is_mid_frame());
    }

    #[test]
    fn oversized_control_frame_is_rejected() {
        let mut decoder = decoder();
        let mut wire = vec![0x8A, 0x7E, 0x00, 0xC8];
        wire.extend(std::iter::repeat(0u8).take(200));
        let mut input: &[u8] = &wire;
        assert_eq!(
            decoder.decode(&mut input),
            Err(ProtocolViolation::ControlFrameTooLarge(200))
        );
    }

    #[derive(Default)]
    struct RecordingPool {
        sizes: std::sync::Mutex<Vec<usize>>,
    }

    impl crate::pool::BufferPool for RecordingPool {
        fn acquire(&self, size: usize) -> Vec<u8> {
            self.sizes.lock().unwrap().push(size);
            Vec::with_capacity(size)
        }

        fn release(&self, _buffer: Vec<u8>) {}
    }

    #[test]
    fn declared_length_is_not_allocated_before_payload_arrives() {
        let recording = Arc::new(RecordingPool::default());
        let mut decoder = FrameDecoder::new(recording.clone(), 16 * 1024 * 1024);

        // Binary frame announcing 16 MiB - 1 with no payload yet
        let mut input: &[u8] = &[0x82, 0x7F, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF];
        assert_eq!(decoder.decode(&mut input).unwrap(), None);
        assert!(decoder.is_mid_frame());

        let sizes = recording.sizes.lock().unwrap().clone();
        assert_eq!(sizes, vec![MAX_INITIAL_CAPACITY]);
    }

    #[test]
    fn decoded_payloads_come_from_the_pool() {
        let recycling = Arc::new(RecyclingPool::new(8, 4096));
        let mut decoder = FrameDecoder::new(recycling.clone(), 1 << 20);

        let wire = serialize(&Frame::text("pooled"), None);
        let mut input: &[u8] = &wire;
        let frame = decoder.decode(&mut input).unwrap().unwrap();
        assert_eq!(recycling.outstanding(), 1);

        drop(frame);
        assert_eq!(recycling.outstanding(), 0);
    }
}
