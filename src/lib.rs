//! # Cheddar WebSocket Core
//!
//! WebSocket engine used by Cheddar Proxy to relay and inspect upgraded
//! connections.
//!
//! ## Features
//!
//! - Incremental RFC 6455 frame decoding over arbitrarily chunked input
//! - Payload unmasking across reads into pooled buffers
//! - Close handshake coordination with a bounded timeout
//! - Session facade over any byte-chunk transport
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Cheddar Proxy (host)                     │
//! ├─────────────────────────────────────────────────────────┤
//! │               Cheddar WebSocket Core (Rust)              │
//! │  ┌─────────┐  ┌───────────┐  ┌─────────┐  ┌──────────┐  │
//! │  │ Parser  │──│ Collector │──│ Session │──│  Close   │  │
//! │  │         │  │  (pool)   │  │         │  │ Sequence │  │
//! │  └─────────┘  └───────────┘  └─────────┘  └──────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pool;
pub mod websocket;

pub use config::WebSocketConfig;
pub use error::{ProtocolViolation, WebSocketError};
pub use models::{CloseCode, CloseReason, Frame, FrameSummary, FrameType};
pub use pool::{BufferPool, NoPool, PooledBuffer, RecyclingPool, SharedPool};
pub use websocket::{Incoming, WebSocketSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
