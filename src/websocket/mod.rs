//! RFC 6455 framing and connection handling
//!
//! ```text
//!  ChunkSource ──► FrameParser ──► PayloadCollector ──► Incoming
//!                                        │
//!                                 close frames
//!                                        ▼
//!  send() ──────────────────────► CloseSequence
//!     │                                  │
//!     └──────► writer task ◄─────────────┘ ──► ChunkSink
//! ```

pub mod close;
pub mod collector;
pub mod mask;
pub mod parser;
pub mod reader;
pub mod serializer;
pub mod session;
pub mod transport;
pub mod writer;

pub use close::{CloseFrameEvent, CloseSequence, CloseState};
pub use collector::PayloadCollector;
pub use parser::{FrameHeader, FrameParser};
pub use reader::FrameDecoder;
pub use serializer::{encode_frame, serialize};
pub use session::{Incoming, WebSocketSession};
pub use transport::{ChunkSink, ChunkSource, IoSink, IoSource};
pub use writer::OutboundHandle;
