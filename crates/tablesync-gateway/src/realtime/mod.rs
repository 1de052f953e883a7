//! Realtime runtime for the tablesync gateway.
//!
//! Session membership, ownership and soft-delete state shared by every
//! connection task.

pub mod core;

pub use self::core::{
    DedicatedGarbage, DeletedToken, DeletedTokenTemplate, EnterMode, Participant, ParticipantId,
    Session, SessionGarbage, SessionRegistry,
};
