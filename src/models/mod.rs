//! Data models for the WebSocket core
//!
//! Frames, close reasons and capture summaries shared by the codec, the
//! session and tooling.

pub mod capture;
pub mod close;
pub mod websocket;

pub use capture::*;
pub use close::*;
pub use websocket::*;
