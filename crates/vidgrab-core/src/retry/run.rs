//! Retry loop: run a closure until success or policy says stop.

use super::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs `f` until it succeeds or the policy stops retrying.
/// `running` is polled before every attempt; once it turns false the last
/// error is returned without sleeping again.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    running: &dyn Fn() -> bool,
    mut f: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::RetryAfter(d) if running() => {
                        tracing::debug!(attempt, ?kind, "transfer failed, retrying: {}", e);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                    _ => return Err(e),
                }
            }
        }
    }
}
