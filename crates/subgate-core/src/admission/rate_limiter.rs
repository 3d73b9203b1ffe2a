//! Per-user cooldown tracking.
//!
//! Each user has at most one record holding the time of their last
//! admitted request. Records live in a sharded [`DashMap`], so checks for
//! different users do not contend on a single lock while two checks for
//! the same user are serialized by the entry lock of their shard.

use super::clock::ClockSource;
use super::ids::UserId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed; its timestamp has been recorded
    Allowed,
    /// The user is still cooling down
    Limited {
        /// Time until the next request would be allowed
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the request was allowed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Remaining cooldown, zero when allowed.
    #[must_use]
    pub const fn retry_after(&self) -> Duration {
        match self {
            Self::Allowed => Duration::ZERO,
            Self::Limited { retry_after } => *retry_after,
        }
    }
}

/// Enforces a minimum interval between requests from the same user.
#[derive(Debug)]
pub struct RateLimiter {
    records: DashMap<UserId, Instant>,
    cooldown: Duration,
    idle_ttl: Duration,
}

impl RateLimiter {
    /// Create a limiter with the given cooldown.
    ///
    /// Records idle for longer than `idle_ttl` become eligible for
    /// [`RateLimiter::evict_idle`]. The TTL is never shorter than the
    /// cooldown, so eviction cannot shorten a running cooldown.
    #[must_use]
    pub fn new(cooldown: Duration, idle_ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            cooldown,
            idle_ttl: idle_ttl.max(cooldown),
        }
    }

    /// Check whether `user_id` may make a request at `now`, recording it if so.
    ///
    /// A denied check leaves the stored timestamp untouched. A `now` older
    /// than the stored timestamp counts as zero elapsed time and never
    /// rewinds the record.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::{Duration, Instant};
    /// use subgate_core::admission::{RateLimiter, UserId};
    ///
    /// let limiter = RateLimiter::new(Duration::from_secs(5), Duration::from_secs(50));
    /// let user = UserId::from(1_u64);
    /// let t0 = Instant::now();
    ///
    /// assert!(limiter.check_and_record(&user, t0).is_allowed());
    /// let second = limiter.check_and_record(&user, t0 + Duration::from_secs(2));
    /// assert_eq!(second.retry_after(), Duration::from_secs(3));
    /// ```
    pub fn check_and_record(&self, user_id: &UserId, now: Instant) -> RateDecision {
        match self.records.entry(user_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                RateDecision::Allowed
            }
            Entry::Occupied(mut slot) => {
                let last = *slot.get();
                let elapsed = now.saturating_duration_since(last);
                if elapsed >= self.cooldown {
                    slot.insert(last.max(now));
                    RateDecision::Allowed
                } else {
                    RateDecision::Limited {
                        retry_after: self.cooldown - elapsed,
                    }
                }
            }
        }
    }

    /// Timestamp of the last recorded request for `user_id`.
    #[must_use]
    pub fn last_request_at(&self, user_id: &UserId) -> Option<Instant> {
        self.records.get(user_id).map(|r| *r)
    }

    /// Remove records idle for at least the idle TTL. Returns how many were removed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.records.retain(|_, last| {
            let keep = now.saturating_duration_since(*last) < self.idle_ttl;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Number of tracked users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no user is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured cooldown.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Spawn a task that calls [`RateLimiter::evict_idle`] every `interval`
    /// until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        clock: Arc<dyn ClockSource>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let period = interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Rate limit sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.evict_idle(clock.now());
                        if evicted > 0 {
                            debug!(
                                "Evicted {} idle rate limit records ({} remaining)",
                                evicted,
                                self.len()
                            );
                        }
                    }
                }
            }
        })
    }
}
