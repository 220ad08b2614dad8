//! HTTP building blocks for the ServiceFix API client
//!
//! This crate holds the pieces of the client that do not depend on session
//! state: the uniform error shape handed to callers, response envelope
//! unwrapping, and the retry policy used for idempotent requests.

pub mod envelope;
pub mod error;
pub mod retry;

pub use envelope::{find_field, find_str, is_envelope, unwrap_envelope, unwrap_envelope_ref};
pub use error::{ApiError, ErrorKind};
pub use retry::{is_retryable_status, with_retry, RetryPolicy, RetryableError, MAX_BACKOFF};
