//! tablesync gateway library entry.
//!
//! This crate wires the transport, the per-connection multiplexer, the
//! session registry and the handler categories into one server. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod realtime;
pub mod router;
pub mod services;
pub mod store;
pub mod transport;
