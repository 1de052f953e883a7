//! Protocol modules (envelope codec, message catalog, payloads, outcomes).
//!
//! - `envelope`: the JSON wire wrapper (`Send` / `Response`) and its codec.
//! - `catalog`: every message name with its category and kind, so dispatch
//!   code can tell whether a message forwards to peers without looking at
//!   the payload.
//! - `payloads`: typed payload, response and snapshot shapes shared by the
//!   gateway and the client.
//! - `outcome`: what a handler hands back to the multiplexer.
//!
//! Parsers are panic-free: malformed input is reported as `TableSyncError`
//! instead of panicking, keeping the gateway resilient to hostile traffic.

pub mod catalog;
pub mod envelope;
pub mod outcome;
pub mod payloads;

pub use catalog::{Category, MessageDef, MessageKind};
pub use envelope::{decode, encode, Envelope, ResponseEnvelope, SendEnvelope};
pub use outcome::HandlerOutcome;
