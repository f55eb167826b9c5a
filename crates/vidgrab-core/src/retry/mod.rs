//! Retry, backoff and transfer-error classification.
//!
//! Low-level network failures (curl errors, HTTP statuses, storage errors) are
//! classified into [`ErrorKind`]s so the page fetcher, the segment engine and the
//! orchestrator share one backoff policy and one notion of "connection reset".

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status, is_connection_reset};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
