//! `relaybus-core` — message model building blocks.
//!
//! This crate contains **pure protocol** primitives (no transport concerns).

pub mod envelope;
pub mod error;
pub mod topic;

pub use envelope::Event;
pub use error::NameError;
pub use topic::{SCOPE_DELIMITER, ServiceName, Topic};
