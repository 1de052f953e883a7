//! Top-level facade crate for tablesync.
//!
//! Re-exports the core protocol, the gateway library and the client so users
//! can depend on a single crate.

pub mod core {
    pub use tablesync_core::*;
}

pub mod gateway {
    pub use tablesync_gateway::*;
}

pub mod client {
    pub use tablesync_client::*;
}
