//! Bounded polling waits.
//!
//! The list page updates whenever the server pushes a change, which may be
//! long after the click that caused it has returned. Any assertion about
//! DOM state that appears or disappears later must go through
//! [`wait_until`]; a bare query right after a mutating operation may still
//! see the old DOM.
//!
//! A predicate is an async closure returning something [`Satisfied`]:
//! `bool`, `Option<T>` or `Vec<T>`. Polling stops on the first `true`,
//! `Some` or non-empty result and hands that value back to the caller.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::result::{ProbeError, ProbeResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// SATISFIED
// =============================================================================

/// Outcome of one predicate evaluation
pub trait Satisfied {
    /// Value handed back once the condition holds
    type Output;

    /// `Some` when the condition holds
    fn satisfied(self) -> Option<Self::Output>;
}

impl Satisfied for bool {
    type Output = ();

    fn satisfied(self) -> Option<()> {
        self.then_some(())
    }
}

impl<T> Satisfied for Option<T> {
    type Output = T;

    fn satisfied(self) -> Option<T> {
        self
    }
}

impl<T> Satisfied for Vec<T> {
    type Output = Self;

    fn satisfied(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }
}

// =============================================================================
// WAIT
// =============================================================================

/// Poll `predicate` until it is satisfied or `options.timeout_ms` elapses.
///
/// The predicate runs at least once, even with a zero timeout. A
/// [`ProbeError::StaleElement`] from the predicate counts as "not yet";
/// any other error ends the wait immediately.
///
/// # Errors
///
/// Returns [`ProbeError::Timeout`] if the condition never holds, or the
/// first non-transient error raised by the predicate.
pub async fn wait_until<F, Fut, S>(
    options: &WaitOptions,
    waited_for: &str,
    mut predicate: F,
) -> ProbeResult<S::Output>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<S>>,
    S: Satisfied,
{
    let start = Instant::now();
    let deadline = start + options.timeout();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match predicate().await {
            Ok(outcome) => {
                if let Some(value) = outcome.satisfied() {
                    debug!(
                        waited_for,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "wait satisfied"
                    );
                    return Ok(value);
                }
            }
            Err(err) if err.is_transient() => {
                trace!(waited_for, error = %err, "transient error while polling");
            }
            Err(err) => return Err(err),
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(waited_for, attempts, timeout_ms = options.timeout_ms, "wait timed out");
            return Err(ProbeError::Timeout {
                ms: options.timeout_ms,
                waited_for: waited_for.to_string(),
            });
        }
        sleep(options.poll_interval().min(deadline - now)).await;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_wait_options_default() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_wait_options_chained() {
            let opts = WaitOptions::new().with_timeout(10_000).with_poll_interval(200);
            assert_eq!(opts.timeout(), Duration::from_secs(10));
            assert_eq!(opts.poll_interval(), Duration::from_millis(200));
        }
    }

    mod satisfied_tests {
        use super::*;

        #[test]
        fn test_bool() {
            assert_eq!(true.satisfied(), Some(()));
            assert_eq!(false.satisfied(), None);
        }

        #[test]
        fn test_option() {
            assert_eq!(Some(3).satisfied(), Some(3));
            assert_eq!(None::<u8>.satisfied(), None);
        }

        #[test]
        fn test_vec() {
            assert_eq!(vec![1, 2].satisfied(), Some(vec![1, 2]));
            assert_eq!(Vec::<u8>::new().satisfied(), None);
        }
    }

    mod wait_until_tests {
        use super::*;

        #[tokio::test]
        async fn test_immediate_success() {
            let opts = WaitOptions::new().with_timeout(100);
            let value = wait_until(&opts, "constant", || async { Ok(Some(7)) })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        #[tokio::test(start_paused = true)]
        async fn test_succeeds_after_several_polls() {
            let calls = AtomicU32::new(0);
            let opts = WaitOptions::new().with_timeout(1_000).with_poll_interval(10);
            wait_until(&opts, "third call", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n >= 2) }
            })
            .await
            .unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_times_out() {
            let opts = WaitOptions::new().with_timeout(200).with_poll_interval(50);
            let err = wait_until(&opts, "never", || async { Ok(false) })
                .await
                .unwrap_err();
            match err {
                ProbeError::Timeout { ms, waited_for } => {
                    assert_eq!(ms, 200);
                    assert_eq!(waited_for, "never");
                }
                other => panic!("expected timeout, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_zero_timeout_polls_once() {
            let calls = AtomicU32::new(0);
            let opts = WaitOptions::new().with_timeout(0);
            let result = wait_until(&opts, "once", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Vec::<u8>::new()) }
            })
            .await;
            assert!(result.unwrap_err().is_timeout());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_stale_element_keeps_polling() {
            let calls = AtomicU32::new(0);
            let opts = WaitOptions::new().with_timeout(1_000).with_poll_interval(10);
            let value = wait_until(&opts, "row", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProbeError::StaleElement { id: "item:1".into() })
                    } else {
                        Ok(Some("row"))
                    }
                }
            })
            .await
            .unwrap();
            assert_eq!(value, "row");
        }

        #[tokio::test]
        async fn test_hard_error_stops_immediately() {
            let calls = AtomicU32::new(0);
            let opts = WaitOptions::new().with_timeout(1_000);
            let err = wait_until(&opts, "page", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<bool, _>(ProbeError::PageError {
                        message: "target closed".into(),
                    })
                }
            })
            .await
            .unwrap_err();
            assert!(matches!(err, ProbeError::PageError { .. }));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
