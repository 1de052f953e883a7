//! Realtime core components for the gateway runtime.
//!
//! Participants, sessions with their ownership rules, the session registry
//! and the per-session soft-delete buffers.

mod garbage;
mod participant;
mod session;
mod session_registry;

pub use garbage::{DedicatedGarbage, DeletedToken, DeletedTokenTemplate, SessionGarbage};
pub use participant::{Participant, ParticipantId};
pub use session::{EnterMode, Session};
pub use session_registry::SessionRegistry;
