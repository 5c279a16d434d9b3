//! Utility modules

pub mod retry;

pub use retry::{retry_on_conflict, DEFAULT_MAX_ATTEMPTS};
