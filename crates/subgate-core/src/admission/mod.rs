//! Admission control layer.
//!
//! Every inbound message passes through [`RequestGate::admit`] before any
//! expensive work is started. The gate consults the [`RateLimiter`] first,
//! then the [`SubscriptionChecker`], and finally marks the user as busy for
//! the lifetime of the returned [`ProcessingGuard`].

mod cache;
mod clock;
mod error;
mod gate;
mod ids;
mod rate_limiter;
mod subscription;

pub use cache::CachedSubscriptionChecker;
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{GateError, PlatformQueryError};
pub use gate::{AdmitResult, BusyPolicy, GateStats, ProcessingGuard, RequestGate};
pub use ids::{ChannelId, UserId};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use subscription::{
    ChannelMembership, MemberStatus, MembershipChecker, QueryMode, SubscriptionChecker,
    SubscriptionRequirement,
};

#[cfg(test)]
pub use subscription::{MockChannelMembership, MockSubscriptionChecker};
