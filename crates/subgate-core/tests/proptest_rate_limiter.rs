use proptest::prelude::*;
use std::time::{Duration, Instant};
use subgate_core::admission::{RateDecision, RateLimiter, UserId};

const COOLDOWN_MS: u64 = 5_000;

fn limiter() -> RateLimiter {
    RateLimiter::new(
        Duration::from_millis(COOLDOWN_MS),
        Duration::from_millis(COOLDOWN_MS * 10),
    )
}

proptest! {
    /// A second request inside the window is denied with the exact remainder.
    #[test]
    fn within_window_denied_with_remainder(gap in 0..COOLDOWN_MS) {
        let limiter = limiter();
        let user = UserId::from(1_u64);
        let t0 = Instant::now();

        prop_assert!(limiter.check_and_record(&user, t0).is_allowed());
        let decision = limiter.check_and_record(&user, t0 + Duration::from_millis(gap));
        prop_assert_eq!(
            decision,
            RateDecision::Limited { retry_after: Duration::from_millis(COOLDOWN_MS - gap) }
        );
    }

    /// Once the cooldown has passed the request goes through again.
    #[test]
    fn after_window_allowed(gap in COOLDOWN_MS..COOLDOWN_MS * 100) {
        let limiter = limiter();
        let user = UserId::from(1_u64);
        let t0 = Instant::now();

        prop_assert!(limiter.check_and_record(&user, t0).is_allowed());
        prop_assert!(limiter.check_and_record(&user, t0 + Duration::from_millis(gap)).is_allowed());
    }

    /// Any number of denied attempts leaves the recorded timestamp alone.
    #[test]
    fn denials_never_advance_record(mut gaps in proptest::collection::vec(0..COOLDOWN_MS, 1..20)) {
        let limiter = limiter();
        let user = UserId::from(1_u64);
        let t0 = Instant::now();
        limiter.check_and_record(&user, t0);

        gaps.sort_unstable();
        for gap in gaps {
            prop_assert!(!limiter.check_and_record(&user, t0 + Duration::from_millis(gap)).is_allowed());
            prop_assert_eq!(limiter.last_request_at(&user), Some(t0));
        }
    }

    /// Recorded timestamps never move backwards, whatever order times arrive in.
    #[test]
    fn record_is_monotonic(offsets in proptest::collection::vec(0..COOLDOWN_MS * 20, 1..40)) {
        let limiter = limiter();
        let user = UserId::from(1_u64);
        let t0 = Instant::now();
        let mut previous: Option<Instant> = None;

        for offset in offsets {
            limiter.check_and_record(&user, t0 + Duration::from_millis(offset));
            let current = limiter.last_request_at(&user);
            if let (Some(prev), Some(cur)) = (previous, current) {
                prop_assert!(cur >= prev);
            }
            previous = current;
        }
    }
}
