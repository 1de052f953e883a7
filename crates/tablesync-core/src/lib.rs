//! tablesync core: transport-agnostic protocol primitives, error types, the
//! handler dispatch table and the channel multiplexer.
//!
//! This crate defines the wire-level contracts shared by the gateway and the
//! client. It carries no transport dependency: the multiplexer writes encoded
//! frames into a [`socket::FrameSink`] and is fed decoded frames by whoever
//! owns the connection, so the same code runs over a WebSocket or an
//! in-memory pipe.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `TableSyncError`/`Result` so production
//! processes do not crash on malformed input or bad traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod socket;

/// Shared result type.
pub use error::{Result, TableSyncError};
