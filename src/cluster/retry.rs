//! Unified retry policies for consistent backoff behavior.
//!
//! Ad-hoc retry loops drift; these named policies keep every caller on the
//! same backoff curve, always with jitter to avoid thundering herds.
//!
//! | Policy | Min Delay | Max Delay | Retries | Use Case |
//! |--------|-----------|-----------|---------|----------|
//! | `meta_policy` | 20ms | 2s | 5 | meta-store reads and scans |
//! | `fast_policy` | 5ms | 100ms | 3 | hot-path CAS contention |
//!
//! The allocator's window reservation combines `fast_policy` with its own
//! attempt bound, since persistent CAS failure there is a fatal condition
//! rather than something to wait out.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Policy for meta-store reads and scans (cluster load, counters).
///
/// Moderate initial delay and a max far below the leader lease, so a
/// transient store hiccup is absorbed without the keep-alive noticing.
pub fn meta_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(5)
        .with_jitter()
}

/// Policy for hot-path retries where latency matters.
///
/// Used for CAS contention on the allocator key, which only happens
/// briefly around leader changes.
pub fn fast_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(100))
        .with_max_times(3)
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use backon::Retryable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn fast_policy_retries_until_success() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32, &str> = (|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("transient")
            } else {
                Ok(7)
            }
        })
        .retry(fast_policy())
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn meta_policy_gives_up_after_budget() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), &str> = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("always")
        })
        .retry(meta_policy())
        .await;

        assert!(result.is_err());
        // Initial call plus five retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
    }
}
