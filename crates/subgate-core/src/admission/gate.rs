//! The single admission decision point.
//!
//! Order of checks: cooldown first (cheap, and it shields the platform
//! lookups from floods), then channel subscriptions, then the busy flag.

use super::ids::{ChannelId, UserId};
use super::rate_limiter::{RateDecision, RateLimiter};
use super::subscription::SubscriptionChecker;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What to do with a request from a user whose previous request is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Admit it and log a warning
    #[default]
    Advisory,
    /// Deny it with [`AdmitResult::DeniedBusy`]
    Reject,
}

impl FromStr for BusyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advisory" => Ok(Self::Advisory),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown busy policy: {other}")),
        }
    }
}

/// Result of [`RequestGate::admit`].
#[derive(Debug)]
#[must_use]
pub enum AdmitResult {
    /// The request may proceed; the user stays busy until the guard is released
    Allowed(ProcessingGuard),
    /// The user is still cooling down
    DeniedRateLimit {
        /// Time until the next request would be allowed
        retry_after: Duration,
    },
    /// The user has not joined every required channel
    DeniedSubscription {
        /// Unjoined channels, in requirement order
        missing: Vec<ChannelId>,
    },
    /// A previous request is still running and the policy is [`BusyPolicy::Reject`]
    DeniedBusy,
}

impl AdmitResult {
    /// Whether the request was admitted.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

#[derive(Debug)]
struct InFlight {
    count: usize,
    since: Instant,
}

/// Per-user in-flight request counts. Busy means at least one.
#[derive(Debug, Default)]
struct ProcessingState {
    in_flight: DashMap<UserId, InFlight>,
}

impl ProcessingState {
    fn release(&self, user_id: &UserId) {
        if let Entry::Occupied(mut entry) = self.in_flight.entry(user_id.clone()) {
            if entry.get().count <= 1 {
                let held = entry.get().since.elapsed();
                entry.remove();
                debug!("User {user_id} is idle again after {held:?}");
            } else {
                entry.get_mut().count -= 1;
            }
        }
    }

    fn is_busy(&self, user_id: &UserId) -> bool {
        self.in_flight.contains_key(user_id)
    }
}

/// Keeps its user busy until dropped or completed.
///
/// Returned inside [`AdmitResult::Allowed`]. Hold it for the whole
/// handler; every exit path, including early returns and panics,
/// releases the busy state exactly once.
#[must_use = "dropping the guard immediately marks the user idle"]
pub struct ProcessingGuard {
    user_id: UserId,
    state: Arc<ProcessingState>,
    released: bool,
}

impl ProcessingGuard {
    /// User this guard belongs to.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Release the busy state now.
    pub fn complete(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.release(&self.user_id);
        }
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ProcessingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingGuard")
            .field("user_id", &self.user_id)
            .field("released", &self.released)
            .finish()
    }
}

#[derive(Debug, Default)]
struct GateCounters {
    admitted: AtomicU64,
    rate_limited: AtomicU64,
    subscription_denied: AtomicU64,
    busy_denied: AtomicU64,
    check_failures: AtomicU64,
}

/// Snapshot of gate activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    /// Requests admitted
    pub admitted: u64,
    /// Requests denied by the cooldown
    pub rate_limited: u64,
    /// Requests denied for missing subscriptions
    pub subscription_denied: u64,
    /// Requests denied because the user was busy
    pub busy_denied: u64,
    /// Subscription checks that failed as a whole and were denied fail-closed
    pub check_failures: u64,
    /// Users with a request currently running
    pub busy_users: usize,
    /// Users with a rate-limit record
    pub tracked_users: usize,
}

/// Admission control in front of every expensive handler.
///
/// Constructed once by the host and shared behind an `Arc`.
pub struct RequestGate {
    rate_limiter: Arc<RateLimiter>,
    checker: Arc<dyn SubscriptionChecker>,
    processing: Arc<ProcessingState>,
    busy_policy: BusyPolicy,
    counters: GateCounters,
}

impl RequestGate {
    /// Create a gate.
    #[must_use]
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        checker: Arc<dyn SubscriptionChecker>,
        busy_policy: BusyPolicy,
    ) -> Self {
        Self {
            rate_limiter,
            checker,
            processing: Arc::new(ProcessingState::default()),
            busy_policy,
            counters: GateCounters::default(),
        }
    }

    /// Decide whether a request from `user_id` arriving at `now` may proceed.
    ///
    /// Platform failures never escape: a failed subscription check denies
    /// with the full requirement list.
    pub async fn admit(&self, user_id: &UserId, now: Instant) -> AdmitResult {
        if let RateDecision::Limited { retry_after } =
            self.rate_limiter.check_and_record(user_id, now)
        {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            debug!("User {user_id} rate limited, retry after {retry_after:?}");
            return AdmitResult::DeniedRateLimit { retry_after };
        }

        let missing = self.subscription_status(user_id).await;
        if !missing.is_empty() {
            self.counters
                .subscription_denied
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                "User {user_id} is missing {} required channel(s)",
                missing.len()
            );
            return AdmitResult::DeniedSubscription { missing };
        }

        match self.processing.in_flight.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => match self.busy_policy {
                BusyPolicy::Reject => {
                    self.counters.busy_denied.fetch_add(1, Ordering::Relaxed);
                    info!("User {user_id} still has a request in progress, rejecting");
                    return AdmitResult::DeniedBusy;
                }
                BusyPolicy::Advisory => {
                    warn!(
                        "User {user_id} sent a new request while {} previous one(s) are still running, proceeding",
                        entry.get().count
                    );
                    entry.get_mut().count += 1;
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(InFlight {
                    count: 1,
                    since: Instant::now(),
                });
            }
        }

        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        AdmitResult::Allowed(ProcessingGuard {
            user_id: user_id.clone(),
            state: self.processing.clone(),
            released: false,
        })
    }

    /// Channels `user_id` still has to join, without touching the cooldown.
    ///
    /// Fails closed like [`RequestGate::admit`].
    pub async fn subscription_status(&self, user_id: &UserId) -> Vec<ChannelId> {
        match self.checker.missing_channels(user_id).await {
            Ok(missing) => missing,
            Err(e) => {
                self.counters.check_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Subscription check failed for user {user_id}, denying: {e}");
                self.checker.requirement().channels().to_vec()
            }
        }
    }

    /// Mark one running request of `user_id` as finished.
    ///
    /// Prefer letting the [`ProcessingGuard`] do this. Calling it for an
    /// idle user does nothing.
    pub fn complete(&self, user_id: &UserId) {
        self.processing.release(user_id);
    }

    /// Whether `user_id` has a request running.
    #[must_use]
    pub fn is_busy(&self, user_id: &UserId) -> bool {
        self.processing.is_busy(user_id)
    }

    /// Shared rate limiter, e.g. for spawning its sweeper.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Configured busy policy.
    #[must_use]
    pub const fn busy_policy(&self) -> BusyPolicy {
        self.busy_policy
    }

    /// Snapshot of counters.
    #[must_use]
    pub fn stats(&self) -> GateStats {
        GateStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            subscription_denied: self.counters.subscription_denied.load(Ordering::Relaxed),
            busy_denied: self.counters.busy_denied.load(Ordering::Relaxed),
            check_failures: self.counters.check_failures.load(Ordering::Relaxed),
            busy_users: self.processing.in_flight.len(),
            tracked_users: self.rate_limiter.len(),
        }
    }
}
