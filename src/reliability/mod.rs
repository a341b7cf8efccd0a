//! Reliability primitives.
//!
//! - [`retry`] - Bounded exponential backoff for transient failures

pub mod retry;

pub use retry::{RetryConfig, retry_async};
