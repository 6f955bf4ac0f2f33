//! Retry with exponential backoff for transient store I/O.

use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io;
use std::thread;
use std::time::Duration;

/// How hard the file store tries before giving up on an I/O error.
///
/// Read from the `store` section of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub retry_attempts: u32,
    /// Base delay, doubled after every failed attempt
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), with up to 50% jitter
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.retry_backoff.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = (base.as_millis() / 2) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts.
pub fn with_retry<T>(policy: &RetryPolicy, what: &str, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let attempts = policy.retry_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Transient store error while {} (attempt {}/{}): {}. Retrying in {:?}",
                    what,
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
