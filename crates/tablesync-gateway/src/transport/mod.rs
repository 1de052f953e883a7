//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler and the codec that turns socket messages
//! into text frames for the connection's multiplexer.

pub mod codec;
pub mod ws;
