//! Dispatcher module exports.
//!
//! The dispatch table itself lives in `tablesync_core::dispatch`; this module
//! binds it to the gateway's handler context and provides the per-connection
//! processor that routes forwards to session peers.

pub mod processor;

use tablesync_core::dispatch::Dispatcher;

use crate::context::HandlerCtx;

pub use processor::ConnectionProcessor;

/// Dispatch table specialised to gateway handlers.
pub type GatewayDispatcher = Dispatcher<HandlerCtx>;
