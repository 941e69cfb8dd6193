//! Core value types shared by the provider boundary and the orchestrator.

pub mod message;
pub mod usage;

pub use message::*;
pub use usage::*;
