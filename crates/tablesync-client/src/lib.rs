//! tablesync client.
//!
//! - `connection`: a WebSocket connection driving one multiplexer; server
//!   pushes run through the same dispatch table type as on the server.
//! - `history`: undo/redo stacks whose actions run strictly one at a time.

pub mod connection;
pub mod history;

pub use connection::ClientConnection;
pub use history::{Action, BidirectionalAction, Completion, History, HistoryRegistry, HistoryState};
