//! Handler categories.
//!
//! - `account`: login and account creation
//! - `campaign`: creating, hosting and joining campaigns, token templates
//! - `board`: boards and the tokens on them

pub mod account;
pub mod board;
pub mod campaign;

pub use account::AccountHandlers;
pub use board::BoardHandlers;
pub use campaign::CampaignHandlers;
