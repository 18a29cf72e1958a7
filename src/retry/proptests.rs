//! Property-based tests for backoff delays

use super::{compute_delay, RetryPolicy};
use proptest::prelude::*;
use std::time::Duration;

fn policy_strategy(exponential: bool) -> impl Strategy<Value = RetryPolicy> {
    (1u32..=10, 100u64..=30_000, 100u64..=30_000).prop_map(move |(max_attempts, a, b)| {
        let (base, max) = if a <= b { (a, b) } else { (b, a) };
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base),
            exponential,
            max_delay: Duration::from_millis(max),
        }
    })
}

proptest! {
    /// Property: exponential delays never exceed max_delay
    #[test]
    fn exponential_delay_is_capped(
        policy in policy_strategy(true),
        attempt in 1u32..200,
    ) {
        prop_assert!(compute_delay(&policy, attempt) <= policy.max_delay);
    }

    /// Property: exponential delays are monotonically non-decreasing
    #[test]
    fn exponential_delay_is_monotone(
        policy in policy_strategy(true),
        attempt in 1u32..100,
    ) {
        prop_assert!(compute_delay(&policy, attempt) <= compute_delay(&policy, attempt + 1));
    }

    /// Property: the first retry always waits exactly base_delay
    #[test]
    fn first_delay_is_base(policy in policy_strategy(true)) {
        prop_assert_eq!(compute_delay(&policy, 1), policy.base_delay);
    }

    /// Property: without exponential backoff every delay equals base_delay
    #[test]
    fn linear_delay_is_constant(
        policy in policy_strategy(false),
        attempt in 1u32..200,
    ) {
        prop_assert_eq!(compute_delay(&policy, attempt), policy.base_delay);
    }
}
