//! Utility modules: backoff, usage tracking.

pub mod retry;
pub mod usage;
