//! Outbound frame writer
//!
//! A single task owns the sink. Everything that wants to put a frame on the
//! wire (the application, automatic pongs, the close handshake) goes through
//! an [`OutboundHandle`], which keeps frames in FIFO order.

use bytes::BytesMut;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::WebSocketError;
use crate::models::Frame;
use crate::websocket::mask::generate_mask_key;
use crate::websocket::serializer::encode_frame;
use crate::websocket::transport::ChunkSink;

pub(crate) enum WriterCommand {
    Frame(Frame),
    Flush(oneshot::Sender<io::Result<()>>),
}

/// Cloneable handle feeding the writer task
#[derive(Clone)]
pub struct OutboundHandle {
    tx: mpsc::Sender<WriterCommand>,
}

impl OutboundHandle {
    pub(crate) fn new(tx: mpsc::Sender<WriterCommand>) -> Self {
        Self { tx }
    }

    /// Queue a frame behind everything already queued
    pub async fn send(&self, frame: Frame) -> Result<(), WebSocketError> {
        self.tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| WebSocketError::SessionClosed)
    }

    /// Wait until every frame queued so far has reached the sink and the
    /// sink has been flushed
    pub async fn flush(&self) -> Result<(), WebSocketError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(ack))
            .await
            .map_err(|_| WebSocketError::SessionClosed)?;
        done.await.map_err(|_| WebSocketError::SessionClosed)??;
        Ok(())
    }
}

/// Drive the sink until every handle is gone or the sink fails
pub(crate) async fn write_loop<K: ChunkSink>(
    mut sink: K,
    mut commands: mpsc::Receiver<WriterCommand>,
    masking: Arc<AtomicBool>,
    session_id: String,
) {
    let mut buf = BytesMut::new();

    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Frame(frame) => {
                let mask_key = masking
                    .load(Ordering::Acquire)
                    .then(generate_mask_key);
                encode_frame(&frame, mask_key, &mut buf);
                tracing::trace!(
                    "WebSocket {}: writing {} frame ({} bytes)",
                    session_id,
                    frame.frame_type().as_str(),
                    frame.payload().len()
                );
                drop(frame);

                if let Err(e) = sink.write(buf.split().freeze()).await {
                    tracing::debug!("WebSocket {}: error writing frame: {}", session_id, e);
                    break;
                }
            }
            WriterCommand::Flush(ack) => {
                let result = sink.flush().await;
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    tracing::debug!("WebSocket {}: flush failed, stopping writer", session_id);
                    break;
                }
            }
        }
    }

    tracing::debug!("WebSocket {}: writer stopped", session_id);
}
