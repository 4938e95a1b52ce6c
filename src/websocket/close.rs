//! WebSocket close handshake
//!
//! Local close requests and close frames received from the peer race each
//! other. Both are funnelled into one bounded queue drained by a single task:
//! the first event decides the close reason and whether a close frame is
//! sent or echoed, every later event is discarded and its buffer released.
//!
//! ```text
//!             ToSend ──► send, then wait for the peer's close ──┐
//!  Idle ──►                                                     ├──► finalizer(reason)
//!             Received ─► echo reason, flush ───────────────────┘
//!                   (whole negotiation bounded by the close timeout)
//! ```
//!
//! The finalizer runs exactly once whether the negotiation completes, times
//! out, or the task is aborted.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use crate::error::WebSocketError;
use crate::models::{CloseReason, Frame};
use crate::websocket::writer::OutboundHandle;

/// Queue depth; room for both a local and a peer close without blocking
pub const CLOSE_QUEUE_CAPACITY: usize = 2;

/// A close frame entering the handshake
#[derive(Debug)]
pub enum CloseFrameEvent {
    /// Close frame decoded from the peer
    Received(Frame),
    /// Close frame the local application wants to send
    ToSend(Frame),
}

impl CloseFrameEvent {
    pub fn frame(&self) -> &Frame {
        match self {
            CloseFrameEvent::Received(frame) | CloseFrameEvent::ToSend(frame) => frame,
        }
    }
}

/// Progress of the close handshake for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseState {
    Idle,
    CloseSent,
    CloseReceived,
    ClosingTimedOut,
    Terminated,
}

/// Receives the terminal close reason, `None` when none was negotiated
pub type Finalizer = Box<dyn FnOnce(Option<CloseReason>) + Send>;

enum Stage {
    Idle {
        events: mpsc::Receiver<CloseFrameEvent>,
        finalizer: Finalizer,
    },
    Running(AbortHandle),
    Done,
}

/// Close handshake coordinator for one connection
///
/// The coordinating task is spawned on the first queued event. Until then
/// nothing runs, and cancelling simply finalizes with no reason.
pub struct CloseSequence {
    events: Mutex<Option<mpsc::Sender<CloseFrameEvent>>>,
    stage: Mutex<Stage>,
    outbound: OutboundHandle,
    timeout: Duration,
    state: Arc<watch::Sender<CloseState>>,
}

impl CloseSequence {
    pub fn new<F>(outbound: OutboundHandle, timeout: Duration, finalizer: F) -> Self
    where
        F: FnOnce(Option<CloseReason>) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CLOSE_QUEUE_CAPACITY);
        let (state, _) = watch::channel(CloseState::Idle);
        Self {
            events: Mutex::new(Some(tx)),
            stage: Mutex::new(Stage::Idle {
                events: rx,
                finalizer: Box::new(finalizer),
            }),
            outbound,
            timeout,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> CloseState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CloseState> {
        self.state.subscribe()
    }

    /// Enqueue a close event, starting the coordinator if needed
    ///
    /// Returns `false` when the queue was already shut down; the event is
    /// dropped and its buffer released.
    pub async fn send(&self, event: CloseFrameEvent) -> bool {
        let Some(tx) = self.sender() else {
            tracing::trace!("close queue shut down, dropping close event");
            return false;
        };
        self.start();
        tx.send(event).await.is_ok()
    }

    /// Stop accepting events
    ///
    /// A running handshake drains what is queued and finishes. If no event
    /// ever arrived the finalizer runs right away with no reason.
    pub fn shutdown(&self) {
        self.lock_events().take();

        let mut stage = self.lock_stage();
        if matches!(*stage, Stage::Idle { .. }) {
            if let Stage::Idle { finalizer, .. } = std::mem::replace(&mut *stage, Stage::Done) {
                drop(stage);
                drop(Finalize::new(finalizer, Arc::clone(&self.state)));
            }
        }
    }

    /// Abandon the handshake immediately; the finalizer still runs
    pub fn cancel(&self) {
        self.lock_events().take();

        let mut stage = self.lock_stage();
        match std::mem::replace(&mut *stage, Stage::Done) {
            Stage::Idle { finalizer, .. } => {
                drop(stage);
                drop(Finalize::new(finalizer, Arc::clone(&self.state)));
            }
            Stage::Running(task) => task.abort(),
            Stage::Done => {}
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<CloseFrameEvent>> {
        self.lock_events().clone()
    }

    fn start(&self) {
        let mut stage = self.lock_stage();
        if !matches!(*stage, Stage::Idle { .. }) {
            return;
        }
        if let Stage::Idle { events, finalizer } = std::mem::replace(&mut *stage, Stage::Done) {
            // Owned by the task future from the start, so an abort before the
            // first poll still runs the finalizer
            let outcome = Finalize::new(finalizer, Arc::clone(&self.state));
            let task = tokio::spawn(run(
                events,
                self.outbound.clone(),
                self.timeout,
                Arc::clone(&self.state),
                outcome,
            ));
            *stage = Stage::Running(task.abort_handle());
        }
    }

    fn lock_events(&self) -> MutexGuard<'_, Option<mpsc::Sender<CloseFrameEvent>>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_stage(&self) -> MutexGuard<'_, Stage> {
        self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for CloseSequence {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Hands the recorded reason to the finalizer when dropped
struct Finalize {
    reason: Option<CloseReason>,
    finalizer: Option<Finalizer>,
    state: Arc<watch::Sender<CloseState>>,
}

impl Finalize {
    fn new(finalizer: Finalizer, state: Arc<watch::Sender<CloseState>>) -> Self {
        Self {
            reason: None,
            finalizer: Some(finalizer),
            state,
        }
    }
}

impl Drop for Finalize {
    fn drop(&mut self) {
        self.state.send_replace(CloseState::Terminated);
        if let Some(finalizer) = self.finalizer.take() {
            finalizer(self.reason.take());
        }
    }
}

async fn run(
    mut events: mpsc::Receiver<CloseFrameEvent>,
    outbound: OutboundHandle,
    timeout: Duration,
    state: Arc<watch::Sender<CloseState>>,
    mut outcome: Finalize,
) {
    let Some(first) = events.recv().await else {
        return;
    };

    let negotiation = negotiate(first, &mut events, &outbound, &state, &mut outcome.reason);
    match tokio::time::timeout(timeout, negotiation).await {
        Ok(Ok(())) => tracing::debug!("close handshake completed"),
        Ok(Err(e)) => tracing::debug!("close handshake abandoned: {}", e),
        Err(_) => {
            state.send_replace(CloseState::ClosingTimedOut);
            tracing::warn!("{}", WebSocketError::HandshakeTimeout(timeout));
        }
    }
}

async fn negotiate(
    first: CloseFrameEvent,
    events: &mut mpsc::Receiver<CloseFrameEvent>,
    outbound: &OutboundHandle,
    state: &watch::Sender<CloseState>,
    reason: &mut Option<CloseReason>,
) -> Result<(), WebSocketError> {
    *reason = match first.frame().read_reason() {
        Ok(Some(decoded)) => Some(decoded),
        Ok(None) => Some(CloseReason::normal()),
        Err(e) => {
            tracing::debug!("unreadable close reason: {}", e);
            None
        }
    };

    match first {
        CloseFrameEvent::ToSend(frame) => {
            state.send_replace(CloseState::CloseSent);
            outbound.send(frame).await?;
            outbound.flush().await?;

            // Wait for the peer's close; further local closes are dropped
            while let Some(event) = events.recv().await {
                let local = matches!(event, CloseFrameEvent::ToSend(_));
                tracing::trace!(
                    "discarding {} close event after close was sent",
                    if local { "local" } else { "peer" }
                );
                drop(event);
                if !local {
                    break;
                }
            }
        }
        CloseFrameEvent::Received(frame) => {
            state.send_replace(CloseState::CloseReceived);
            frame.into_payload().release();

            let echo = reason.clone().unwrap_or_else(CloseReason::ok);
            outbound.send(Frame::close(&echo)).await?;
            outbound.flush().await?;
        }
    }
    Ok(())
}
