//! Parallel fan-out/collect.
//!
//! Whenever the relay must address several peers or backends at once (exit
//! node fan-outs, connectivity introspection, k-value propagation) it uses
//! this primitive: run an operation over every target concurrently, capture
//! success-or-error per target, and hand back one complete result set.
//!
//! The contract, precisely:
//!
//! - every target's operation starts without waiting for any other target;
//! - one slow or failed target never blocks or aborts its siblings;
//! - the aggregate completes exactly once, only after every target has
//!   reported, and it never fails as a whole - partial failure is
//!   communicated per key, which is why the return type is a plain `Vec`
//!   rather than a `Result`;
//! - input order (and therefore key association) is preserved in the output;
//! - an empty target set completes immediately with an empty result set.

use futures::future::join_all;
use std::future::Future;

/// Runs `op` over every `(key, value)` entry concurrently and collects
/// per-key outcomes in input order.
///
/// The key is cloned into the operation so callers can address the target
/// (e.g. a hostport) and is returned alongside the outcome so results stay
/// attributable after concurrent completion.
pub async fn collect_parallel<K, V, T, E, F, Fut>(
    targets: Vec<(K, V)>,
    op: F,
) -> Vec<(K, std::result::Result<T, E>)>
where
    K: Clone,
    F: Fn(V, K) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let tasks = targets.into_iter().map(|(key, value)| {
        let fut = op(value, key.clone());
        async move { (key, fut.await) }
    });
    join_all(tasks).await
}

/// Runs `op` over a plain sequence concurrently; outcomes come back in input
/// order, so position is the key.
pub async fn collect_parallel_indexed<V, T, E, F, Fut>(
    items: Vec<V>,
    op: F,
) -> Vec<std::result::Result<T, E>>
where
    F: Fn(V, usize) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let tasks = items
        .into_iter()
        .enumerate()
        .map(|(index, value)| op(value, index));
    join_all(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_targets_complete_immediately() {
        let calls = AtomicUsize::new(0);
        let results: Vec<(String, Result<i64, String>)> =
            collect_parallel(Vec::new(), |_v: i64, _k| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(0) }
            })
            .await;
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_per_key() {
        let targets = vec![("a".to_string(), 1i64), ("b".to_string(), 2i64)];
        let results = collect_parallel(targets, |value, key| async move {
            if key == "a" {
                Err(format!("boom {value}"))
            } else {
                Ok(value * 10)
            }
        })
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[0].1, Err("boom 1".to_string()));
        assert_eq!(results[1].0, "b");
        assert_eq!(results[1].1, Ok(20));
    }

    #[tokio::test]
    async fn test_order_preserved_under_reversed_completion() {
        // The first target finishes last; output order must still match
        // input order.
        let targets = vec![("slow".to_string(), 40u64), ("fast".to_string(), 5u64)];
        let results: Vec<(String, Result<u64, ()>)> =
            collect_parallel(targets, |delay_ms, _key| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(delay_ms)
            })
            .await;

        assert_eq!(results[0].0, "slow");
        assert_eq!(results[0].1, Ok(40));
        assert_eq!(results[1].0, "fast");
        assert_eq!(results[1].1, Ok(5));
    }

    #[tokio::test]
    async fn test_targets_run_concurrently() {
        // Four targets sleeping 50ms each finish in far less than 200ms when
        // they overlap.
        let start = std::time::Instant::now();
        let items = vec![50u64; 4];
        let results: Vec<Result<usize, ()>> =
            collect_parallel_indexed(items, |delay_ms, index| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(index)
            })
            .await;
        assert_eq!(results.len(), 4);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_all_targets_failing_still_completes() {
        let results: Vec<Result<(), String>> =
            collect_parallel_indexed(vec![1, 2, 3], |v, _| async move {
                Err(format!("err {v}"))
            })
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[tokio::test]
    async fn test_indexed_keys_match_positions() {
        let results: Vec<Result<usize, ()>> =
            collect_parallel_indexed(vec!["x", "y", "z"], |_v, index| async move { Ok(index) })
                .await;
        assert_eq!(results, vec![Ok(0), Ok(1), Ok(2)]);
    }
}
