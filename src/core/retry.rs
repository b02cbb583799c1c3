use std::time::Duration;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values of 0 are treated as 1.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Run `op` up to `policy.attempts` times, sleeping `policy.delay` between
/// attempts. An error for which `retryable` returns false is returned
/// immediately.
pub fn retry<T, E, F, P>(policy: &RetryPolicy, mut op: F, mut retryable: P) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: FnMut(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !retryable(&err) {
                    return Err(err);
                }
                tracing::warn!(
                    target = "pool",
                    attempt,
                    attempts,
                    "attempt failed: {err}"
                );
                last_err = Some(err);
                if attempt < attempts && !policy.delay.is_zero() {
                    std::thread::sleep(policy.delay);
                }
            }
        }
    }
    // attempts >= 1, so at least one error was recorded.
    Err(last_err.unwrap())
}
