//! WebSocket session facade
//!
//! Wires a [`ChunkSource`] and [`ChunkSink`] to a reader task, a writer task
//! and the close handshake. The application sends through the session and
//! consumes received frames from [`Incoming`].

use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use crate::config::WebSocketConfig;
use crate::error::WebSocketError;
use crate::models::{CloseReason, Frame, FrameType};
use crate::pool::SharedPool;
use crate::websocket::close::{CloseFrameEvent, CloseSequence, CloseState};
use crate::websocket::reader::{read_loop, ReadContext};
use crate::websocket::transport::{ChunkSink, ChunkSource, IoSink, IoSource};
use crate::websocket::writer::{write_loop, OutboundHandle};

/// Abort handles for the per-connection tasks
#[derive(Default)]
struct SessionTasks {
    inner: Mutex<TaskList>,
}

#[derive(Default)]
struct TaskList {
    handles: Vec<AbortHandle>,
    aborted: bool,
}

impl SessionTasks {
    fn track(&self, handle: AbortHandle) {
        let mut list = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if list.aborted {
            handle.abort();
        } else {
            list.handles.push(handle);
        }
    }

    fn abort_all(&self) {
        let mut list = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        list.aborted = true;
        for handle in list.handles.drain(..) {
            handle.abort();
        }
    }
}

/// One WebSocket connection after the upgrade handshake
pub struct WebSocketSession {
    id: String,
    outbound: OutboundHandle,
    close: Arc<CloseSequence>,
    masking: Arc<AtomicBool>,
    tasks: Arc<SessionTasks>,
    /// `Some(reason)` once the close handshake has been finalized
    terminated: watch::Receiver<Option<Option<CloseReason>>>,
}

impl WebSocketSession {
    /// Start the reader and writer tasks for a connection
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S, K>(
        source: S,
        sink: K,
        config: &WebSocketConfig,
        pool: SharedPool,
    ) -> (Self, Incoming)
    where
        S: ChunkSource,
        K: ChunkSink,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let masking = Arc::new(AtomicBool::new(config.masking));
        let tasks = Arc::new(SessionTasks::default());

        let (command_tx, command_rx) = mpsc::channel(config.outgoing_capacity.max(1));
        let outbound = OutboundHandle::new(command_tx);

        let (terminated_tx, terminated) = watch::channel(None);
        let finalizer = {
            let tasks = Arc::clone(&tasks);
            let id = id.clone();
            move |reason: Option<CloseReason>| {
                tasks.abort_all();
                match &reason {
                    Some(reason) => tracing::debug!("WebSocket {}: closed ({})", id, reason),
                    None => tracing::debug!("WebSocket {}: closed without a reason", id),
                }
                terminated_tx.send_replace(Some(reason));
            }
        };
        let close = Arc::new(CloseSequence::new(
            outbound.clone(),
            config.close_timeout(),
            finalizer,
        ));

        let (frames_tx, frames_rx) = mpsc::channel(config.incoming_capacity.max(1));

        let writer = tokio::spawn(write_loop(
            sink,
            command_rx,
            Arc::clone(&masking),
            id.clone(),
        ));
        tasks.track(writer.abort_handle());

        let reader = tokio::spawn(read_loop(
            source,
            ReadContext {
                session_id: id.clone(),
                pool,
                max_frame_size: config.max_frame_size,
                auto_pong: config.auto_pong,
                frames: frames_tx,
                close: Arc::clone(&close),
                outbound: outbound.clone(),
            },
        ));
        tasks.track(reader.abort_handle());

        tracing::debug!(
            "WebSocket {}: session started (masking={})",
            id,
            config.masking
        );

        let session = Self {
            id,
            outbound,
            close,
            masking,
            tasks,
            terminated,
        };
        (session, Incoming { rx: frames_rx })
    }

    /// Start a session over tokio I/O halves
    ///
    /// Reads are issued in `config.read_chunk_size` pieces.
    pub fn start_io<R, W>(
        reader: R,
        writer: W,
        config: &WebSocketConfig,
        pool: SharedPool,
    ) -> (Self, Incoming)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::start(
            IoSource::new(reader, config.read_chunk_size),
            IoSink::new(writer),
            config,
            pool,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a frame for the peer
    ///
    /// Close frames go through the close handshake: only the first close of
    /// the connection reaches the wire.
    pub async fn send(&self, frame: Frame) -> Result<(), WebSocketError> {
        frame.validate()?;
        if self.is_closed() {
            return Err(WebSocketError::SessionClosed);
        }

        if frame.frame_type() == FrameType::Close {
            return if self.close.send(CloseFrameEvent::ToSend(frame)).await {
                Ok(())
            } else {
                Err(WebSocketError::SessionClosed)
            };
        }
        self.outbound.send(frame).await
    }

    /// Wait until everything sent so far has been written and flushed
    pub async fn flush(&self) -> Result<(), WebSocketError> {
        self.outbound.flush().await
    }

    /// Start a graceful close and wait for the connection to terminate
    ///
    /// Returns the terminal reason, which is the peer's if the peer closed
    /// first.
    pub async fn close(&self, reason: CloseReason) -> Result<Option<CloseReason>, WebSocketError> {
        self.send(Frame::close(&reason)).await?;
        Ok(self.closed().await)
    }

    /// Tear the connection down without a close handshake
    pub fn terminate(&self) {
        if !self.is_closed() {
            tracing::debug!("WebSocket {}: terminating", self.id);
        }
        self.tasks.abort_all();
        self.close.cancel();
    }

    /// Wait for termination and return the terminal close reason
    pub async fn closed(&self) -> Option<CloseReason> {
        let mut terminated = self.terminated.clone();
        let _ = terminated.wait_for(Option::is_some).await;
        let reason = terminated.borrow().clone();
        reason.flatten()
    }

    pub fn is_closed(&self) -> bool {
        self.terminated.borrow().is_some()
    }

    pub fn close_state(&self) -> CloseState {
        self.close.state()
    }

    /// Switch masking of outgoing frames on or off
    pub fn set_masking(&self, masking: bool) {
        self.masking.store(masking, Ordering::Release);
    }

    pub fn masking(&self) -> bool {
        self.masking.load(Ordering::Acquire)
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Frames received from the peer, in arrival order
///
/// Ends when the transport closes, after a protocol error has been yielded,
/// or when the session terminates. Close frames are handled by the session
/// and never appear here.
pub struct Incoming {
    rx: mpsc::Receiver<Result<Frame, WebSocketError>>,
}

impl Incoming {
    pub async fn next_frame(&mut self) -> Option<Result<Frame, WebSocketError>> {
        self.rx.recv().await
    }
}

impl Stream for Incoming {
    type Item = Result<Frame, WebSocketError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
